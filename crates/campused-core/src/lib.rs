//! Core types and utilities for campused.
//!
//! This crate provides the domain types shared by the store and the HTTP service:
//!
//! - **Identifiers**: `UserId`, `PlanId`, `OrderId`, `ChannelId`, `ExamId`
//! - **Pricing**: `PricingTable`, `ServiceTier`, `ModelPrice`, `CostBreakdown`
//! - **Usage**: `UsageReport`, `UsageEntry`
//! - **Balances**: `CreditBalance`
//! - **Subscriptions**: `Plan`, `Order`
//! - **Chat and exams**: `Channel`, `ChatMessage`, `Exam`, `ExamMode`, `ExamRequest`
//!
//! # Billing Unit
//!
//! **1 token of balance = 1 LLM token (input or output)**
//!
//! - A plan purchase grants `token_limit` tokens
//! - A chat turn that consumes 200 input and 100 output tokens debits 300 tokens
//! - USD costs are tracked alongside for audit, never for balance arithmetic

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod channel;
pub mod error;
pub mod exam;
pub mod ids;
pub mod pricing;
pub mod subscription;
pub mod usage;

pub use balance::CreditBalance;
pub use channel::{strip_file_names, Channel, ChatMessage, Role, CHAT_SYSTEM_PROMPT};
pub use error::{BillingError, Result};
pub use exam::{
    CorrectOptions, Difficulty, Exam, ExamMode, ExamQuestions, ExamRequest, Flashcard, Language,
    McqQuestion, EXAM_SUBJECTS,
};
pub use ids::{ChannelId, ExamId, IdError, OrderId, PlanId, UserId};
pub use pricing::{merge_cost, CostBreakdown, ModelPrice, PricingTable, ServiceTier};
pub use subscription::{Order, Plan};
pub use usage::{UsageEntry, UsageReport};
