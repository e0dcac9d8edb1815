//! Service configuration.

use serde::Deserialize;
use std::path::Path;

use campused_core::{BillingError, PricingTable, ServiceTier};

/// Default per-file upload limit (20 MiB).
pub const DEFAULT_MAX_UPLOAD_FILE_BYTES: usize = 20 * 1024 * 1024;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `PRICING_TIER` is not a known tier.
    #[error("PRICING_TIER: {0}")]
    Tier(#[from] BillingError),

    /// The pricing file could not be read or parsed.
    #[error("pricing file {path}: {message}")]
    PricingFile {
        /// File path.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// A configured model has no price under the configured tier.
    #[error("model '{model}' is not priced under tier {tier}")]
    UnpricedModel {
        /// The model.
        model: String,
        /// The tier.
        tier: ServiceTier,
    },
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL URL. Without it the service runs on an in-memory store.
    pub database_url: Option<String>,

    /// Pool size (default: 10).
    pub database_max_connections: u32,

    /// HS256 secret used to verify bearer tokens.
    pub auth_jwt_secret: String,

    /// Expected JWT audience (default: "campused").
    pub auth_audience: String,

    /// Admin API key for plan management.
    pub admin_api_key: Option<String>,

    /// OpenAI API key.
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL.
    pub openai_base_url: String,

    /// Model answering chat turns.
    pub chat_model: String,

    /// Model transcribing uploaded images.
    pub vision_model: String,

    /// Model generating exams.
    pub exam_model: String,

    /// Tier usage is priced at.
    pub pricing_tier: ServiceTier,

    /// Optional JSON file replacing the built-in pricing table.
    pub pricing_file: Option<String>,

    /// Razorpay key ID (optional).
    pub razorpay_key_id: Option<String>,

    /// Razorpay key secret (optional).
    pub razorpay_key_secret: Option<String>,

    /// Razorpay webhook secret (optional).
    pub razorpay_webhook_secret: Option<String>,

    /// Razorpay API base URL.
    pub razorpay_base_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Maximum size of one uploaded file in bytes.
    pub max_upload_file_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Razorpay secrets file structure.
#[derive(Debug, Deserialize)]
struct RazorpaySecrets {
    key_id: String,
    key_secret: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICING_TIER` is not a known tier.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Try to load Razorpay secrets from file first, then fall back to env vars
        let (razorpay_key_id, razorpay_key_secret, razorpay_webhook_secret) =
            load_razorpay_secrets();

        let pricing_tier = match std::env::var("PRICING_TIER") {
            Ok(tier) => tier.parse()?,
            Err(_) => defaults.pricing_tier,
        };

        Ok(Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            auth_jwt_secret: std::env::var("AUTH_JWT_SECRET").unwrap_or_else(|_| {
                tracing::warn!("AUTH_JWT_SECRET not set - using an insecure development secret");
                defaults.auth_jwt_secret
            }),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            chat_model: std::env::var("CHAT_MODEL").unwrap_or(defaults.chat_model),
            vision_model: std::env::var("VISION_MODEL").unwrap_or(defaults.vision_model),
            exam_model: std::env::var("EXAM_MODEL").unwrap_or(defaults.exam_model),
            pricing_tier,
            pricing_file: std::env::var("PRICING_FILE").ok(),
            razorpay_key_id,
            razorpay_key_secret,
            razorpay_webhook_secret,
            razorpay_base_url: std::env::var("RAZORPAY_BASE_URL")
                .unwrap_or(defaults.razorpay_base_url),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            max_upload_file_bytes: env_parse("MAX_UPLOAD_FILE_BYTES")
                .unwrap_or(defaults.max_upload_file_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
        })
    }

    /// Build the pricing table: the built-in one, or `pricing_file` if set.
    ///
    /// Every configured model must be priced under `pricing_tier`, so a
    /// deploy mismatch fails here instead of at settlement.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or a model is unpriced.
    pub fn load_pricing(&self) -> Result<PricingTable, ConfigError> {
        let table = match &self.pricing_file {
            Some(path) => {
                let pricing_error = |message: String| ConfigError::PricingFile {
                    path: path.clone(),
                    message,
                };
                let contents =
                    std::fs::read_to_string(path).map_err(|e| pricing_error(e.to_string()))?;
                let table =
                    PricingTable::from_json(&contents).map_err(|e| pricing_error(e.to_string()))?;
                tracing::info!(path = %path, "Loaded pricing table from file");
                table
            }
            None => PricingTable::default(),
        };

        for model in [&self.chat_model, &self.vision_model, &self.exam_model] {
            if !table.contains(self.pricing_tier, model) {
                return Err(ConfigError::UnpricedModel {
                    model: model.clone(),
                    tier: self.pricing_tier,
                });
            }
        }

        Ok(table)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Load Razorpay secrets from file or environment.
fn load_razorpay_secrets() -> (Option<String>, Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/razorpay.json",
        "campused/.secrets/razorpay.json",
        "../.secrets/razorpay.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<RazorpaySecrets>(path) {
            tracing::info!(path = %path, "Loaded Razorpay secrets from file");
            return (
                Some(secrets.key_id),
                Some(secrets.key_secret),
                secrets.webhook_secret,
            );
        }
    }

    // Fall back to environment variables
    tracing::debug!("Razorpay secrets file not found, using environment variables");
    (
        std::env::var("RAZORPAY_KEY_ID").ok(),
        std::env::var("RAZORPAY_KEY_SECRET").ok(),
        std::env::var("RAZORPAY_WEBHOOK_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 10,
            auth_jwt_secret: "campused-dev-secret".into(),
            auth_audience: "campused".into(),
            admin_api_key: None,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".into(),
            chat_model: "gpt-4.1-mini".into(),
            vision_model: "gpt-4.1-mini".into(),
            exam_model: "gpt-4o-mini".into(),
            pricing_tier: ServiceTier::Standard,
            pricing_file: None,
            razorpay_key_id: None,
            razorpay_key_secret: None,
            razorpay_webhook_secret: None,
            razorpay_base_url: "https://api.razorpay.com".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 50 * 1024 * 1024,
            max_upload_file_bytes: DEFAULT_MAX_UPLOAD_FILE_BYTES,
            request_timeout_seconds: 120,
        }
    }
}
