//! Runtime configuration
//!
//! Everything comes from the environment (a `.env` file is honored via
//! `dotenvy` in `main`, with real environment variables taking
//! precedence). Credentials go through the secrets module so they can be
//! served from the 1Password CLI instead of the environment.

use crate::secrets::{load_secret, SecretError};
use thiserror::Error;
use zeroize::Zeroizing;

const OP_REF_FLEX_TOKEN: &str = "op://Private/InteractiveBrokers/flex_token";
const OP_REF_MF_PASSWORD: &str = "op://Private/MoneyForward/password";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable not set: {0}")]
    MissingVar(String),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Configuration for one sync run.
pub struct SyncConfig {
    /// Flex Web Service access token.
    pub flex_token: Zeroizing<String>,
    /// Flex query id configured for this sync.
    pub flex_query_id: String,
    /// Ledger account email.
    pub mf_email: String,
    /// Ledger account password.
    pub mf_password: Zeroizing<String>,
    /// Optional override for the ledger page URL.
    pub portfolio_url: Option<String>,
    /// Wait after each mutating actuation, seconds.
    pub settle_delay_secs: u64,
    /// How often to poll for a statement still being generated.
    pub poll_attempts: u32,
    pub poll_delay_secs: u64,
}

impl SyncConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<SyncConfig, ConfigError> {
        let flex_token = load_secret(OP_REF_FLEX_TOKEN, "IB_FLEX_TOKEN")?;
        let flex_query_id = require_var("IB_FLEX_QUERY_ID")?;
        let mf_email = require_var("MF_EMAIL")?;
        let mf_password = load_secret(OP_REF_MF_PASSWORD, "MF_PASSWORD")?;

        let mut config = SyncConfig {
            flex_token,
            flex_query_id,
            mf_email,
            mf_password,
            portfolio_url: std::env::var("MF_PORTFOLIO_URL").ok(),
            settle_delay_secs: 3,
            poll_attempts: 5,
            poll_delay_secs: 5,
        };

        if let Ok(raw) = std::env::var("SYNC_SETTLE_DELAY_SECS") {
            match raw.parse::<u64>() {
                Ok(value) if (1..=60).contains(&value) => config.settle_delay_secs = value,
                _ => tracing::warn!(
                    "invalid SYNC_SETTLE_DELAY_SECS '{}' (expected 1..=60), using default: {}",
                    raw,
                    config.settle_delay_secs
                ),
            }
        }
        if let Ok(raw) = std::env::var("FLEX_POLL_ATTEMPTS") {
            match raw.parse::<u32>() {
                Ok(value) if (1..=20).contains(&value) => config.poll_attempts = value,
                _ => tracing::warn!(
                    "invalid FLEX_POLL_ATTEMPTS '{}' (expected 1..=20), using default: {}",
                    raw,
                    config.poll_attempts
                ),
            }
        }
        if let Ok(raw) = std::env::var("FLEX_POLL_DELAY_SECS") {
            match raw.parse::<u64>() {
                Ok(value) if (1..=120).contains(&value) => config.poll_delay_secs = value,
                _ => tracing::warn!(
                    "invalid FLEX_POLL_DELAY_SECS '{}' (expected 1..=120), using default: {}",
                    raw,
                    config.poll_delay_secs
                ),
            }
        }

        Ok(config)
    }
}

fn require_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .map_err(|_| ConfigError::MissingVar(name.to_string()))
        .map(|value| value.trim().to_string())
        .and_then(|value| {
            if value.is_empty() {
                Err(ConfigError::MissingVar(name.to_string()))
            } else {
                Ok(value)
            }
        })
}
