//! Razorpay integration for plan purchases.
//!
//! Razorpay handles:
//! - Order creation for a plan price
//! - Checkout signature verification
//! - Webhook signature verification

pub mod client;
pub mod types;

pub use client::RazorpayClient;
pub use client::RazorpayError;
pub use types::*;
