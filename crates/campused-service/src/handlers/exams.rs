//! Practice exam handlers.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use campused_core::{
    Difficulty, Exam, ExamId, ExamMode, ExamQuestions, ExamRequest, Language, UsageReport,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::metering::{Metered, MeteredError};
use crate::state::AppState;

/// A stored exam.
#[derive(Debug, Serialize)]
pub struct ExamResponse {
    /// Exam record ID.
    pub id: ExamId,
    /// Canonical exam key.
    pub exam: String,
    /// Subject.
    pub subject: String,
    /// Difficulty.
    pub difficulty: Difficulty,
    /// Language.
    pub language: Language,
    /// MCQ or flashcard.
    pub mode: ExamMode,
    /// Generated questions.
    pub questions_answers: ExamQuestions,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl From<Exam> for ExamResponse {
    fn from(exam: Exam) -> Self {
        Self {
            id: exam.id,
            exam: exam.exam,
            subject: exam.subject,
            difficulty: exam.difficulty,
            language: exam.language,
            mode: exam.mode,
            questions_answers: exam.questions,
            updated_at: exam.updated_at,
        }
    }
}

/// Exam list entry.
#[derive(Debug, Serialize)]
pub struct ExamSummary {
    /// Exam record ID.
    pub id: ExamId,
    /// Canonical exam key.
    pub exam: String,
    /// Difficulty.
    pub difficulty: Difficulty,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

/// Generate and store a practice exam.
pub async fn generate_exam(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    payload: Result<Json<ExamRequest>, JsonRejection>,
) -> Result<Metered<(StatusCode, Json<ExamResponse>)>, MeteredError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = request.validated().map_err(ApiError::from)?;

    let model = state.config.exam_model.as_str();
    let mode = request.mode;
    let mut usage = UsageReport::new();

    let completion = state
        .llm
        .generate_structured(
            model,
            &mode.system_prompt(&request),
            &ExamMode::user_prompt(request.count),
            mode.schema_name(),
            &mode.output_schema(),
        )
        .await
        .map_err(ApiError::from)?;
    completion.record_into(&mut usage, model);

    let questions = match mode.parse_questions(&completion.text) {
        Ok(questions) => questions,
        Err(e) => {
            tracing::error!(
                user_id = %auth.user_id,
                mode = %mode,
                error = %e,
                "Model returned malformed exam questions"
            );
            return Err(MeteredError::new(
                ApiError::ExternalService("Model returned malformed questions".into()),
                usage,
            ));
        }
    };

    let cost = state.gate.price(&usage);
    let exam = Exam::new(auth.user_id, &request, questions, cost);

    if let Err(e) = state.store.put_exam(&exam).await {
        tracing::error!(exam_id = %exam.id, error = %e, "Failed to save exam");
        return Err(MeteredError::new(e, usage));
    }

    tracing::info!(
        exam_id = %exam.id,
        user_id = %auth.user_id,
        exam = %exam.exam,
        mode = %mode,
        questions = exam.questions.len(),
        tokens = usage.total_units(),
        "Exam generated"
    );

    Ok(Metered::new(
        (StatusCode::CREATED, Json(ExamResponse::from(exam))),
        usage,
    ))
}

/// List the caller's exams, most recently changed first.
pub async fn list_exams(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<ExamSummary>>, ApiError> {
    let exams = state.store.list_exams(&auth.user_id).await?;
    Ok(Json(
        exams
            .into_iter()
            .map(|e| ExamSummary {
                id: e.id,
                exam: e.exam,
                difficulty: e.difficulty,
                updated_at: e.updated_at,
            })
            .collect(),
    ))
}

/// Get one of the caller's exams.
pub async fn get_exam(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    exam_id: Result<Path<ExamId>, PathRejection>,
) -> Result<Json<ExamResponse>, ApiError> {
    let Path(exam_id) = exam_id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let exam = state
        .store
        .get_exam(&auth.user_id, &exam_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Exam not found".into()))?;
    Ok(Json(exam.into()))
}
