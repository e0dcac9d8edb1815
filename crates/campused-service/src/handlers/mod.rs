//! API handlers.

// Allow precision loss in handlers - prices displayed are well within f64 precision
#![allow(clippy::cast_precision_loss)]

pub mod admin;
pub mod channels;
pub mod credits;
pub mod exams;
pub mod health;
pub mod subscriptions;
