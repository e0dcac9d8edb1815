//! Chat channels: a persisted multi-turn conversation and what it cost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::CostBreakdown;
use crate::{ChannelId, UserId};

/// System prompt every channel starts with.
pub const CHAT_SYSTEM_PROMPT: &str = "You are a Exam Preparation helpful assistant. You help students to prepare for their exams by providing them with relevant information and resources. You can also help them to create study plans and schedules. You are very friendly and always respond in a positive manner. You can provide the answer directly or MCQ questions if the user asks for it or on your own for their better clarity about the topics.";

/// Prefix of the system message holding an image transcription.
pub const IMAGE_CONTEXT_PREFIX: &str =
    "This is the information that I have extracted from the image that user shared: \n";

/// Prefix of the system message holding extracted document text.
pub const DOCUMENT_CONTEXT_PREFIX: &str =
    "This is the information that I have extracted from the document that user shared:\n\n";

/// Title used when the client does not send one.
pub const DEFAULT_CHANNEL_TITLE: &str = "new chat";

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and extracted file context.
    System,
    /// The student.
    User,
    /// The model.
    Assistant,
}

/// One message in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author.
    pub role: Role,
    /// Text.
    pub content: String,
    /// Names of files attached to a user message. Never sent to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            files: None,
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            files: None,
        }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            files: None,
        }
    }
}

/// Copy of `conversation` without file-name annotations.
#[must_use]
pub fn strip_file_names(conversation: &[ChatMessage]) -> Vec<ChatMessage> {
    conversation
        .iter()
        .map(|message| ChatMessage {
            files: None,
            ..message.clone()
        })
        .collect()
}

/// A persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel ID.
    pub id: ChannelId,

    /// Owner.
    pub user_id: UserId,

    /// Display title.
    pub title: String,

    /// Full conversation, system prompt first.
    pub context: Vec<ChatMessage>,

    /// Accumulated cost of every turn.
    pub token_cost: Option<CostBreakdown>,

    /// When the channel was created.
    pub created_at: DateTime<Utc>,

    /// When the channel last changed.
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Start a conversation with the exam-preparation system prompt.
    #[must_use]
    pub fn new(user_id: UserId, title: Option<String>) -> Self {
        let now = Utc::now();
        let title = title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CHANNEL_TITLE.to_string());

        Self {
            id: ChannelId::generate(),
            user_id,
            title,
            context: vec![ChatMessage::system(CHAT_SYSTEM_PROMPT)],
            token_cost: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append the transcription of an uploaded image.
    pub fn push_image_context(&mut self, transcription: &str) {
        self.context
            .push(ChatMessage::system(format!("{IMAGE_CONTEXT_PREFIX}{transcription}")));
    }

    /// Append the text of an uploaded document.
    pub fn push_document_context(&mut self, text: &str) {
        self.context
            .push(ChatMessage::system(format!("{DOCUMENT_CONTEXT_PREFIX}{text}")));
    }

    /// Messages to send to the model for `query`.
    #[must_use]
    pub fn prompt_for(&self, query: &str) -> Vec<ChatMessage> {
        let mut prompt = strip_file_names(&self.context);
        prompt.push(ChatMessage::user(query));
        prompt
    }

    /// Append a completed question and answer. `files` names the uploads of
    /// this turn and is only recorded when non-empty.
    pub fn push_exchange(&mut self, query: &str, reply: &str, files: Vec<String>) {
        let mut user = ChatMessage::user(query);
        if !files.is_empty() {
            user.files = Some(files);
        }
        self.context.push(user);
        self.context.push(ChatMessage::assistant(reply));
    }

    /// Fold the cost of a turn into the channel's running total.
    pub fn add_cost(&mut self, cost: CostBreakdown) {
        self.token_cost = Some(match self.token_cost.take() {
            Some(total) => total.merge(&cost),
            None => cost,
        });
    }

    /// Mark the channel as changed now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
