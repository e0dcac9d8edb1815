//! Campused HTTP API Service.
//!
//! This crate provides the HTTP API for the campused exam-preparation
//! assistant, including:
//!
//! - Chat channels with image and document context
//! - Practice exam generation (MCQ and flashcards)
//! - Subscription plans, Razorpay orders and payment confirmation
//! - Token metering of every model call
//! - Prometheus request metrics
//!
//! # Metering
//!
//! Metered routes run behind the [`metering::meter`] middleware. It admits a
//! request only while the caller has tokens remaining, lets the handler
//! report what it consumed through [`metering::Metered`], debits the total
//! once, and stamps the remaining balance on the response.
//!
//! # Authentication
//!
//! 1. **Bearer JWT** (HS256, shared secret) - for end users
//! 2. **Admin API key** (`X-Admin-Key`) - for plan management

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result

pub mod activation;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod documents;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod metering;
pub mod metrics;
pub mod openai;
pub mod razorpay;
pub mod routes;
pub mod state;

pub use activation::SubscriptionActivator;
pub use config::{ConfigError, ServiceConfig};
pub use error::ApiError;
pub use llm::{Completion, LanguageModel, LlmError};
pub use metering::{Admission, Metered, MeteredError, UsageGate, REMAINING_TOKENS_HEADER};
pub use metrics::HttpMetrics;
pub use openai::OpenAiClient;
pub use razorpay::{RazorpayClient, RazorpayError};
pub use routes::create_router;
pub use state::AppState;
