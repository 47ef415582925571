//! Startup configuration.
//!
//! Secrets come from a JSON file (`access_token`, `channel_secret`) that is
//! read once at process start. Everything else is taken from the environment
//! with defaults.
//!
//! # Config file location
//!
//! Tries, in order:
//! 1. `$CONFIG_PATH` if set
//! 2. `./config.json` if it exists
//! 3. `$XDG_CONFIG_HOME/air-quality-bot/config.json` — typically `~/.config/air-quality-bot/`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_API_BASE_URL: &str = "https://api.line.me";

/// Channel credentials issued by the LINE developers console.
#[derive(Deserialize, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub channel_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("channel_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub listen_addr: String,
    pub api_base_url: String,
}

impl Config {
    /// Load credentials from disk and the rest from the environment.
    pub fn load() -> Result<Self> {
        let path = resolve_config_path();
        let credentials = load_credentials(&path)?;

        let listen_addr =
            std::env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let api_base_url = std::env::var("LINE_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());

        Ok(Self {
            credentials,
            listen_addr,
            api_base_url,
        })
    }
}

/// Read and validate the credentials file.
pub fn load_credentials(path: &Path) -> Result<Credentials> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let credentials: Credentials = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if credentials.access_token.trim().is_empty() {
        bail!("access_token in {} is empty", path.display());
    }
    if credentials.channel_secret.trim().is_empty() {
        bail!("channel_secret in {} is empty", path.display());
    }

    info!(path = %path.display(), "Loaded channel credentials");

    Ok(credentials)
}

fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        return PathBuf::from(path);
    }

    let local = Path::new("config.json");
    if local.is_file() {
        return local.to_path_buf();
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("air-quality-bot")
        .join("config.json")
}
