//! Secret loading
//!
//! Credentials (ledger password, report access token) are loaded into
//! `Zeroizing` strings so they are wiped from memory on drop. A 1Password
//! CLI reference is tried first; the environment variable is the fallback,
//! with a warning, since env vars leak into process listings and crash
//! dumps more easily.

use std::env;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("1Password CLI error: {0}")]
    OnePassword(String),
}

/// Load a secret, preferring the 1Password CLI over the environment.
///
/// `op_reference` is an `op://vault/item/field` reference; `env_var_name`
/// is the fallback environment variable.
pub fn load_secret(
    op_reference: &str,
    env_var_name: &str,
) -> Result<Zeroizing<String>, SecretError> {
    match load_from_op_cli(op_reference) {
        Ok(secret) => return Ok(secret),
        Err(e) => warn!(
            "1Password CLI not available ({}), falling back to ${}",
            e, env_var_name
        ),
    }
    env::var(env_var_name)
        .map(Zeroizing::new)
        .map_err(|_| SecretError::NotFound(env_var_name.to_string()))
}

fn load_from_op_cli(reference: &str) -> Result<Zeroizing<String>, SecretError> {
    use std::process::Command;

    let output = Command::new("op")
        .arg("read")
        .arg(reference)
        .output()
        .map_err(|e| SecretError::OnePassword(format!("failed to execute 'op': {e}")))?;
    if !output.status.success() {
        return Err(SecretError::OnePassword(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    let secret = String::from_utf8(output.stdout)
        .map_err(|e| SecretError::OnePassword(format!("invalid UTF-8 from 'op': {e}")))?
        .trim()
        .to_string();
    if secret.is_empty() {
        return Err(SecretError::OnePassword("empty secret".to_string()));
    }
    Ok(Zeroizing::new(secret))
}
