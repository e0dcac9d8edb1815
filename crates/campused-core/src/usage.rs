//! Request-scoped usage accumulator.
//!
//! A metered handler records one [`UsageEntry`] per billable sub-operation (an
//! image transcription, a chat completion, an exam generation). The gate only
//! reads the final report; an empty report means nothing billable happened.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pricing::{CostBreakdown, PricingTable, ServiceTier};

/// Usage of one billable sub-operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    /// Model that served the call.
    pub model: String,
    /// Input (prompt) tokens.
    pub input_units: u64,
    /// Output (completion) tokens.
    pub output_units: u64,
}

/// Running usage of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    entries: Vec<UsageEntry>,
}

impl UsageReport {
    /// Create an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one billable call.
    pub fn record(&mut self, model: impl Into<String>, input_units: u64, output_units: u64) {
        self.entries.push(UsageEntry {
            model: model.into(),
            input_units,
            output_units,
        });
    }

    /// Append every entry of `other`.
    pub fn absorb(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Entries in the order they were recorded.
    #[must_use]
    pub fn entries(&self) -> &[UsageEntry] {
        &self.entries
    }

    /// Whether nothing billable was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of input tokens.
    #[must_use]
    pub fn input_units(&self) -> u64 {
        self.entries.iter().map(|e| e.input_units).sum()
    }

    /// Sum of output tokens.
    #[must_use]
    pub fn output_units(&self) -> u64 {
        self.entries.iter().map(|e| e.output_units).sum()
    }

    /// Tokens to debit for this request.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.input_units() + self.output_units()
    }

    /// Model of the most recent entry.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.entries.last().map(|e| e.model.as_str())
    }

    /// Price every entry at its own model and merge the results.
    ///
    /// Returns `Ok(None)` for an empty report.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if any entry's model is not priced under `tier`.
    pub fn cost(&self, pricing: &PricingTable, tier: ServiceTier) -> Result<Option<CostBreakdown>> {
        let mut total: Option<CostBreakdown> = None;
        for entry in &self.entries {
            let cost =
                pricing.compute_cost(&entry.model, entry.input_units, entry.output_units, tier)?;
            total = Some(match total {
                Some(acc) => acc.merge(&cost),
                None => cost,
            });
        }
        Ok(total)
    }
}
