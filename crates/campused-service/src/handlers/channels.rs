//! Chat channel handlers.
//!
//! A turn is a multipart request with optional files and an optional query.
//! Images are transcribed by the vision model, documents are read locally,
//! and the query is answered by the chat model with the whole conversation
//! as context. Every model call is recorded in the turn's [`UsageReport`],
//! which the metering layer settles after the response is built.

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::PathRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use campused_core::{Channel, ChannelId, ChatMessage, UsageReport};

use crate::auth::AuthUser;
use crate::documents::{FileKind, UploadedFile};
use crate::error::ApiError;
use crate::metering::{Metered, MeteredError};
use crate::state::AppState;

/// Fields of one chat turn.
#[derive(Debug, Default)]
struct TurnInput {
    query: Option<String>,
    title: Option<String>,
    files: Vec<UploadedFile>,
}

impl TurnInput {
    fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.file_name.clone()).collect()
    }
}

/// Response of a new channel.
#[derive(Debug, Serialize)]
pub struct CreateChannelResponse {
    /// Full conversation.
    pub conversation: Vec<ChatMessage>,
    /// ID of the new channel.
    pub channel_id: ChannelId,
}

/// Conversation of a channel.
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    /// Full conversation.
    pub conversation: Vec<ChatMessage>,
}

/// Channel list entry.
#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    /// Channel ID.
    pub id: ChannelId,
    /// Display title.
    pub title: String,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

/// Start a channel with a first turn.
pub async fn create_channel(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Metered<(StatusCode, Json<CreateChannelResponse>)>, MeteredError> {
    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let input = read_turn(multipart, state.config.max_upload_file_bytes).await?;

    let mut channel = Channel::new(auth.user_id, input.title.clone());
    let usage = run_turn(&state, &mut channel, input).await?;

    tracing::info!(
        channel_id = %channel.id,
        user_id = %auth.user_id,
        tokens = usage.total_units(),
        "Channel created"
    );

    Ok(Metered::new(
        (
            StatusCode::CREATED,
            Json(CreateChannelResponse {
                conversation: channel.context,
                channel_id: channel.id,
            }),
        ),
        usage,
    ))
}

/// Add a turn to an existing channel.
pub async fn continue_channel(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    channel_id: Result<Path<ChannelId>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Metered<Json<ConversationResponse>>, MeteredError> {
    let Path(channel_id) = channel_id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut channel = owned_channel(&state, &auth, &channel_id).await?;
    let input = read_turn(multipart, state.config.max_upload_file_bytes).await?;
    let usage = run_turn(&state, &mut channel, input).await?;

    Ok(Metered::new(
        Json(ConversationResponse {
            conversation: channel.context,
        }),
        usage,
    ))
}

/// List the caller's channels, most recently changed first.
pub async fn list_channels(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<ChannelSummary>>, ApiError> {
    let channels = state.store.list_channels(&auth.user_id).await?;
    Ok(Json(
        channels
            .into_iter()
            .map(|c| ChannelSummary {
                id: c.id,
                title: c.title,
                updated_at: c.updated_at,
            })
            .collect(),
    ))
}

/// Get a channel's conversation.
pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    channel_id: Result<Path<ChannelId>, PathRejection>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let Path(channel_id) = channel_id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let channel = owned_channel(&state, &auth, &channel_id).await?;
    Ok(Json(ConversationResponse {
        conversation: channel.context,
    }))
}

async fn owned_channel(
    state: &AppState,
    auth: &AuthUser,
    channel_id: &ChannelId,
) -> Result<Channel, ApiError> {
    state
        .store
        .get_channel(&auth.user_id, channel_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel not found".into()))
}

/// Read and validate every field before any model is called.
async fn read_turn(mut multipart: Multipart, max_file_bytes: usize) -> Result<TurnInput, ApiError> {
    let mut input = TurnInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "files[]" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                input.files.push(UploadedFile::accept(
                    file_name,
                    content_type,
                    data,
                    max_file_bytes,
                )?);
            }
            "q" | "title" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if name == "q" {
                    input.query = Some(text.to_string());
                } else {
                    input.title = Some(text.to_string());
                }
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    if input.files.is_empty() && input.query.is_none() {
        return Err(ApiError::BadRequest(
            "Either files or a query must be provided".into(),
        ));
    }
    Ok(input)
}

/// Apply one turn to `channel` and persist it. Returns the usage of the turn,
/// or the error together with whatever was billed before it.
async fn run_turn(
    state: &AppState,
    channel: &mut Channel,
    input: TurnInput,
) -> Result<UsageReport, MeteredError> {
    let mut usage = UsageReport::new();
    let vision_model = state.config.vision_model.as_str();
    let chat_model = state.config.chat_model.as_str();

    for file in &input.files {
        match file.kind {
            FileKind::Image => {
                let completion = match state
                    .llm
                    .analyze_image(vision_model, &file.data, &file.content_type)
                    .await
                {
                    Ok(completion) => completion,
                    Err(e) => return Err(MeteredError::new(e, usage)),
                };
                completion.record_into(&mut usage, vision_model);
                channel.push_image_context(&completion.text);
            }
            FileKind::Pdf | FileKind::Docx => {
                let text = match file.extract_text().await {
                    Ok(text) => text,
                    Err(e) => return Err(MeteredError::new(e, usage)),
                };
                channel.push_document_context(&text);
            }
        }
    }

    if let Some(query) = input.query.as_deref() {
        let prompt = channel.prompt_for(query);
        let completion = match state.llm.generate_text(chat_model, &prompt).await {
            Ok(completion) => completion,
            Err(e) => return Err(MeteredError::new(e, usage)),
        };
        completion.record_into(&mut usage, chat_model);
        channel.push_exchange(query, &completion.text, input.file_names());
    }

    if let Some(cost) = state.gate.price(&usage) {
        channel.add_cost(cost);
    }
    channel.touch();

    if let Err(e) = state.store.put_channel(channel).await {
        tracing::error!(channel_id = %channel.id, error = %e, "Failed to save channel");
        return Err(MeteredError::new(e, usage));
    }

    Ok(usage)
}
