//! Pricing table and cost calculator.
//!
//! Prices are USD per one million tokens, keyed by service tier and model. The
//! table is built once at start-up and shared read-only; a model missing from
//! the table is an error, never a default price.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// Decimal places kept when costs leave the calculator.
pub const USD_DECIMAL_PLACES: i32 = 6;

const UNITS_PER_MILLION: f64 = 1_000_000.0;

/// Provider service level a request is billed at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceTier {
    /// Asynchronous batch processing.
    Batch,
    /// Flexible, best-effort processing.
    Flex,
    /// Regular synchronous processing.
    #[default]
    Standard,
    /// Priority processing.
    Priority,
}

impl ServiceTier {
    /// All tiers, cheapest first.
    pub const ALL: [Self; 4] = [Self::Batch, Self::Flex, Self::Standard, Self::Priority];

    /// Canonical tier name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "Batch",
            Self::Flex => "Flex",
            Self::Standard => "Standard",
            Self::Priority => "Priority",
        }
    }
}

impl fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceTier {
    type Err = BillingError;

    /// Tier names are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BillingError::UnknownTier(s.to_string()))
    }
}

/// Price of one model under one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// USD per 1M input tokens.
    pub input_per_million: f64,
    /// USD per 1M output tokens.
    pub output_per_million: f64,
}

impl ModelPrice {
    const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }
}

/// Immutable (tier, model) → price lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    tiers: HashMap<ServiceTier, HashMap<String, ModelPrice>>,
}

impl Default for PricingTable {
    #[allow(clippy::too_many_lines)]
    fn default() -> Self {
        let batch = [
            ("gpt-5", ModelPrice::new(0.625, 5.00)),
            ("gpt-5-mini", ModelPrice::new(0.125, 1.00)),
            ("gpt-5-nano", ModelPrice::new(0.025, 0.20)),
            ("gpt-5-pro", ModelPrice::new(7.50, 60.00)),
            ("gpt-4.1", ModelPrice::new(1.00, 4.00)),
            ("gpt-4.1-mini", ModelPrice::new(0.20, 0.80)),
            ("gpt-4.1-nano", ModelPrice::new(0.05, 0.20)),
            ("gpt-4o", ModelPrice::new(1.25, 5.00)),
            ("gpt-4o-mini", ModelPrice::new(0.075, 0.30)),
            ("o3", ModelPrice::new(1.00, 4.00)),
            ("o4-mini", ModelPrice::new(0.55, 2.20)),
        ];
        let flex = [
            ("gpt-5", ModelPrice::new(0.625, 5.00)),
            ("gpt-5-mini", ModelPrice::new(0.125, 1.00)),
            ("gpt-5-nano", ModelPrice::new(0.025, 0.20)),
            ("o3", ModelPrice::new(1.00, 4.00)),
            ("o4-mini", ModelPrice::new(0.55, 2.20)),
        ];
        let standard = [
            ("gpt-5", ModelPrice::new(1.25, 10.00)),
            ("gpt-5-mini", ModelPrice::new(0.25, 2.00)),
            ("gpt-5-nano", ModelPrice::new(0.05, 0.40)),
            ("gpt-5-pro", ModelPrice::new(15.00, 120.00)),
            ("gpt-4.1", ModelPrice::new(2.00, 8.00)),
            ("gpt-4.1-mini", ModelPrice::new(0.40, 1.60)),
            ("gpt-4.1-nano", ModelPrice::new(0.10, 0.40)),
            ("gpt-4o", ModelPrice::new(2.50, 10.00)),
            ("gpt-4o-mini", ModelPrice::new(0.15, 0.60)),
            ("o3", ModelPrice::new(2.00, 8.00)),
            ("o4-mini", ModelPrice::new(1.10, 4.40)),
        ];
        let priority = [
            ("gpt-5", ModelPrice::new(2.50, 20.00)),
            ("gpt-5-mini", ModelPrice::new(0.45, 3.60)),
            ("gpt-4.1", ModelPrice::new(3.50, 14.00)),
            ("gpt-4.1-mini", ModelPrice::new(0.70, 2.80)),
            ("gpt-4.1-nano", ModelPrice::new(0.20, 0.80)),
            ("gpt-4o", ModelPrice::new(4.25, 17.00)),
            ("gpt-4o-mini", ModelPrice::new(0.25, 1.00)),
            ("o3", ModelPrice::new(3.50, 14.00)),
            ("o4-mini", ModelPrice::new(2.00, 8.00)),
        ];

        let collect = |rows: &[(&str, ModelPrice)]| -> HashMap<String, ModelPrice> {
            rows.iter()
                .map(|(model, price)| ((*model).to_string(), *price))
                .collect()
        };

        let tiers = HashMap::from([
            (ServiceTier::Batch, collect(&batch)),
            (ServiceTier::Flex, collect(&flex)),
            (ServiceTier::Standard, collect(&standard)),
            (ServiceTier::Priority, collect(&priority)),
        ]);

        Self { tiers }
    }
}

impl PricingTable {
    /// Parse a pricing table from JSON of the form
    /// `{"Standard": {"gpt-4.1-mini": {"input_per_million": 0.4, "output_per_million": 1.6}}}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a pricing table.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let tiers = serde_json::from_str(json)?;
        Ok(Self { tiers })
    }

    /// Look up the price of `model` under `tier`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if the tier has no entry for the model.
    pub fn price(&self, tier: ServiceTier, model: &str) -> Result<&ModelPrice> {
        self.tiers
            .get(&tier)
            .and_then(|models| models.get(model))
            .ok_or_else(|| BillingError::UnknownModel {
                model: model.to_string(),
                tier: tier.to_string(),
            })
    }

    /// Look up a price by tier name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTier` for an unrecognised tier name and `UnknownModel`
    /// if the tier has no entry for the model.
    pub fn price_by_name(&self, tier: &str, model: &str) -> Result<&ModelPrice> {
        self.price(tier.parse()?, model)
    }

    /// Whether `model` is priced under `tier`.
    #[must_use]
    pub fn contains(&self, tier: ServiceTier, model: &str) -> bool {
        self.price(tier, model).is_ok()
    }

    /// Convert raw token counts into a cost breakdown.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel` if the model is not priced under `tier`.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute_cost(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        tier: ServiceTier,
    ) -> Result<CostBreakdown> {
        let price = self.price(tier, model)?;

        let input_cost = input_tokens as f64 / UNITS_PER_MILLION * price.input_per_million;
        let output_cost = output_tokens as f64 / UNITS_PER_MILLION * price.output_per_million;

        Ok(CostBreakdown {
            model: model.to_string(),
            tier,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        })
    }
}

/// Cost of one request (or of several merged requests).
///
/// Costs are stored at full precision; use [`CostBreakdown::input_cost_usd`] and
/// friends, or [`CostBreakdown::rounded`], when presenting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Model label. After a merge this is the most recent breakdown's model.
    pub model: String,
    /// Tier the usage was priced at.
    pub tier: ServiceTier,
    /// Input tokens.
    pub input_tokens: u64,
    /// Output tokens.
    pub output_tokens: u64,
    /// `input_tokens + output_tokens`.
    pub total_tokens: u64,
    /// Input cost in USD.
    #[serde(rename = "input_cost_usd")]
    pub input_cost: f64,
    /// Output cost in USD.
    #[serde(rename = "output_cost_usd")]
    pub output_cost: f64,
    /// Total cost in USD.
    #[serde(rename = "total_cost_usd")]
    pub total_cost: f64,
}

impl CostBreakdown {
    /// Input cost rounded to six decimal places.
    #[must_use]
    pub fn input_cost_usd(&self) -> f64 {
        round_usd(self.input_cost)
    }

    /// Output cost rounded to six decimal places.
    #[must_use]
    pub fn output_cost_usd(&self) -> f64 {
        round_usd(self.output_cost)
    }

    /// Total cost rounded to six decimal places.
    #[must_use]
    pub fn total_cost_usd(&self) -> f64 {
        round_usd(self.total_cost)
    }

    /// Copy of this breakdown with every cost rounded for output.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            input_cost: self.input_cost_usd(),
            output_cost: self.output_cost_usd(),
            total_cost: self.total_cost_usd(),
            ..self.clone()
        }
    }

    /// Accumulate `later` into this breakdown.
    ///
    /// Token counts and costs are summed field-wise and totals re-derived; costs
    /// are never recomputed from the merged counts. The result carries `later`'s
    /// model and tier, so merging different models loses attribution.
    #[must_use]
    pub fn merge(&self, later: &Self) -> Self {
        let input_tokens = self.input_tokens + later.input_tokens;
        let output_tokens = self.output_tokens + later.output_tokens;
        let input_cost = self.input_cost + later.input_cost;
        let output_cost = self.output_cost + later.output_cost;

        Self {
            model: later.model.clone(),
            tier: later.tier,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

/// Merge two breakdowns; see [`CostBreakdown::merge`].
#[must_use]
pub fn merge_cost(earlier: &CostBreakdown, later: &CostBreakdown) -> CostBreakdown {
    earlier.merge(later)
}

fn round_usd(value: f64) -> f64 {
    let scale = 10f64.powi(USD_DECIMAL_PLACES);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn one_million_each_on_gpt_41_mini() {
        let table = PricingTable::default();
        let cost = table
            .compute_cost("gpt-4.1-mini", 1_000_000, 1_000_000, ServiceTier::Standard)
            .unwrap();

        assert_eq!(cost.input_cost_usd(), 0.40);
        assert_eq!(cost.output_cost_usd(), 1.60);
        assert_eq!(cost.total_cost_usd(), 2.00);
        assert_eq!(cost.total_tokens, 2_000_000);
        assert_eq!(cost.tier, ServiceTier::Standard);
    }

    #[test]
    fn tiers_price_the_same_model_differently() {
        let table = PricingTable::default();
        let batch = table
            .compute_cost("gpt-4o", 1_000_000, 0, ServiceTier::Batch)
            .unwrap();
        let priority = table
            .compute_cost("gpt-4o", 1_000_000, 0, ServiceTier::Priority)
            .unwrap();

        assert_eq!(batch.input_cost_usd(), 1.25);
        assert_eq!(priority.input_cost_usd(), 4.25);
    }

    #[test]
    fn tier_names_parse_case_insensitively() {
        assert_eq!("standard".parse::<ServiceTier>().unwrap(), ServiceTier::Standard);
        assert_eq!("PRIORITY".parse::<ServiceTier>().unwrap(), ServiceTier::Priority);
        assert_eq!(" Flex ".parse::<ServiceTier>().unwrap(), ServiceTier::Flex);
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let err = "Gold".parse::<ServiceTier>().unwrap_err();
        assert!(matches!(err, BillingError::UnknownTier(ref t) if t == "Gold"));

        let table = PricingTable::default();
        assert!(matches!(
            table.price_by_name("Gold", "gpt-4o"),
            Err(BillingError::UnknownTier(_))
        ));
    }

    #[test]
    fn unknown_model_never_falls_back_to_a_default() {
        let table = PricingTable::default();

        // gpt-4.1 is sold in Standard but not in Flex.
        assert!(table.contains(ServiceTier::Standard, "gpt-4.1"));
        let err = table
            .compute_cost("gpt-4.1", 10, 10, ServiceTier::Flex)
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::UnknownModel { ref model, ref tier } if model == "gpt-4.1" && tier == "Flex"
        ));

        assert!(table
            .compute_cost("mystery-model", 10, 10, ServiceTier::Standard)
            .is_err());
    }

    #[test]
    fn merge_sums_counts_and_costs() {
        let table = PricingTable::default();
        let a = table
            .compute_cost("gpt-4.1-mini", 100, 50, ServiceTier::Standard)
            .unwrap();
        let b = table
            .compute_cost("gpt-4.1-mini", 200, 150, ServiceTier::Standard)
            .unwrap();

        let merged = merge_cost(&a, &b);

        assert_eq!(merged.input_tokens, 300);
        assert_eq!(merged.output_tokens, 200);
        assert_eq!(merged.total_tokens, 500);
        assert!(close(merged.input_cost, a.input_cost + b.input_cost));
        assert!(close(merged.output_cost, a.output_cost + b.output_cost));
        assert!(close(merged.total_cost, a.total_cost + b.total_cost));
    }

    #[test]
    fn merge_keeps_the_later_model_label() {
        let table = PricingTable::default();
        let vision = table
            .compute_cost("gpt-4.1", 1_000, 200, ServiceTier::Standard)
            .unwrap();
        let chat = table
            .compute_cost("gpt-4.1-mini", 500, 100, ServiceTier::Standard)
            .unwrap();

        let merged = vision.merge(&chat);
        assert_eq!(merged.model, "gpt-4.1-mini");
        assert!(close(merged.total_cost, vision.total_cost + chat.total_cost));
    }

    #[test]
    fn repeated_merges_do_not_drift() {
        let table = PricingTable::default();
        let step = table
            .compute_cost("gpt-4o-mini", 7, 3, ServiceTier::Standard)
            .unwrap();

        let mut total = step.clone();
        for _ in 1..1_000 {
            total = total.merge(&step);
        }

        let expected = table
            .compute_cost("gpt-4o-mini", 7_000, 3_000, ServiceTier::Standard)
            .unwrap();
        assert_eq!(total.total_cost_usd(), expected.total_cost_usd());
    }

    #[test]
    fn rounded_copy_keeps_six_places() {
        let table = PricingTable::default();
        let cost = table
            .compute_cost("gpt-5-nano", 1, 1, ServiceTier::Standard)
            .unwrap();

        // 0.05e-6 + 0.40e-6 = 0.45e-6, which rounds to 0.0 at six places.
        assert_eq!(cost.rounded().total_cost, 0.0);
        assert!(cost.total_cost > 0.0);
    }

    #[test]
    fn breakdown_serializes_with_usd_field_names() {
        let table = PricingTable::default();
        let cost = table
            .compute_cost("gpt-4.1-mini", 1_000_000, 0, ServiceTier::Standard)
            .unwrap();
        let json = serde_json::to_value(&cost).unwrap();

        assert_eq!(json["model"], "gpt-4.1-mini");
        assert_eq!(json["tier"], "Standard");
        assert_eq!(json["input_cost_usd"], 0.4);
        assert_eq!(json["total_tokens"], 1_000_000);
    }

    #[test]
    fn table_can_be_loaded_from_json() {
        let table = PricingTable::from_json(
            r#"{"Standard": {"house-model": {"input_per_million": 1.0, "output_per_million": 2.0}}}"#,
        )
        .unwrap();

        let cost = table
            .compute_cost("house-model", 500_000, 500_000, ServiceTier::Standard)
            .unwrap();
        assert_eq!(cost.total_cost_usd(), 1.5);
        assert!(!table.contains(ServiceTier::Standard, "gpt-4o"));
    }
}
