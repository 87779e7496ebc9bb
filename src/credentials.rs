//! API credential persistence.
//!
//! Loads and saves the exchange API key pair to a JSON file, with
//! environment variables taking precedence. The secret is wrapped in
//! `SecretString` and only exposed for signing and saving.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Default credential file path.
const DEFAULT_CREDENTIALS_FILE: &str = "pegbot_credentials.json";

/// Environment variable overrides.
const ENV_API_KEY: &str = "PEGBOT_API_KEY";
const ENV_API_SECRET: &str = "PEGBOT_API_SECRET";

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: SecretString,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret: SecretString::new(api_secret),
        }
    }
}

/// Resolve credentials: environment first, then the JSON file.
/// Returns None when neither source is configured.
pub fn resolve(path: Option<&str>) -> Result<Option<ApiCredentials>> {
    if let (Ok(key), Ok(secret)) = (std::env::var(ENV_API_KEY), std::env::var(ENV_API_SECRET)) {
        if !key.is_empty() && !secret.is_empty() {
            info!("Using API credentials from environment");
            return Ok(Some(ApiCredentials::new(key, secret)));
        }
    }
    load(path)
}

/// Load credentials from a JSON file.
/// Returns None if the file doesn't exist or is empty.
pub fn load(path: Option<&str>) -> Result<Option<ApiCredentials>> {
    let path = path.unwrap_or(DEFAULT_CREDENTIALS_FILE);

    if !Path::new(path).exists() {
        debug!(path, "No credential file found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials from {path}"))?;
    if json.trim().is_empty() {
        return Ok(None);
    }

    let creds: ApiCredentials = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse credentials from {path}"))?;

    info!(path, "Credentials loaded from disk");
    Ok(Some(creds))
}

/// Save credentials to a JSON file.
pub fn save(creds: &ApiCredentials, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_CREDENTIALS_FILE);
    let json = serde_json::to_string_pretty(&serde_json::json!({
        "api_key": creds.api_key,
        "api_secret": creds.api_secret.expose_secret(),
    }))
    .context("Failed to serialise credentials")?;

    std::fs::write(path, &json).with_context(|| format!("Failed to write credentials to {path}"))?;

    debug!(path, "Credentials saved");
    Ok(())
}
