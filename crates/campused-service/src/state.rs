//! Application state.

use std::sync::Arc;

use campused_core::PricingTable;
use campused_store::{CreditLedger, Store};

use crate::activation::SubscriptionActivator;
use crate::config::ServiceConfig;
use crate::llm::{LanguageModel, UnconfiguredModel};
use crate::metering::UsageGate;
use crate::metrics::HttpMetrics;
use crate::openai::OpenAiClient;
use crate::razorpay::RazorpayClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Pricing table, loaded once at start-up.
    pub pricing: Arc<PricingTable>,

    /// Balance ledger.
    pub ledger: CreditLedger,

    /// Metering gate.
    pub gate: UsageGate,

    /// Payment activation.
    pub activator: SubscriptionActivator,

    /// Language model provider.
    pub llm: Arc<dyn LanguageModel>,

    /// Razorpay client for payments (optional).
    pub razorpay: Option<Arc<RazorpayClient>>,

    /// HTTP request metrics.
    pub metrics: HttpMetrics,
}

impl AppState {
    /// Create a new application state, using OpenAI when a key is configured.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig, pricing: PricingTable) -> Self {
        let llm: Arc<dyn LanguageModel> = if let Some(key) = &config.openai_api_key {
            tracing::info!(base_url = %config.openai_base_url, "OpenAI integration enabled");
            Arc::new(OpenAiClient::new(&config.openai_base_url, key))
        } else {
            tracing::warn!("OpenAI not configured - chat and exam generation will not be available");
            Arc::new(UnconfiguredModel)
        };

        Self::with_llm(store, config, pricing, llm)
    }

    /// Create a new application state with an explicit language model.
    #[must_use]
    pub fn with_llm(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        pricing: PricingTable,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        let pricing = Arc::new(pricing);
        let ledger = CreditLedger::new(Arc::clone(&store));
        let gate = UsageGate::new(ledger.clone(), Arc::clone(&pricing), config.pricing_tier);
        let activator = SubscriptionActivator::new(Arc::clone(&store));
        // Fixed metric names into a fresh registry cannot collide.
        let metrics = HttpMetrics::new().expect("HTTP metric definitions are valid");

        // Create Razorpay client if configured
        let razorpay = config
            .razorpay_key_id
            .as_ref()
            .zip(config.razorpay_key_secret.as_ref())
            .map(|(key_id, key_secret)| {
                tracing::info!(
                    webhooks = config.razorpay_webhook_secret.is_some(),
                    "Razorpay integration enabled"
                );
                Arc::new(RazorpayClient::new(
                    &config.razorpay_base_url,
                    key_id,
                    key_secret,
                    config.razorpay_webhook_secret.clone(),
                ))
            });

        if razorpay.is_none() {
            tracing::warn!("Razorpay not configured - payments will not be available");
        }

        Self {
            store,
            config,
            pricing,
            ledger,
            gate,
            activator,
            llm,
            razorpay,
            metrics,
        }
    }

    /// Check if Razorpay is configured.
    #[must_use]
    pub fn has_razorpay(&self) -> bool {
        self.razorpay.is_some()
    }
}
