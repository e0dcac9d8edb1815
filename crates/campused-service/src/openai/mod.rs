//! OpenAI integration.
//!
//! All three kinds of call (chat, image transcription, structured exam
//! generation) go through the Responses API and report usage from its
//! `usage` block.

pub mod client;
pub mod types;

pub use client::OpenAiClient;
pub use types::*;
