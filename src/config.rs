//! TOML configuration.
//!
//! Every section has defaults, so an absent config file is not an error:
//! [`load_config`] falls back to [`Config::default`]. A file that exists but
//! fails to parse or validate is an error.
//!
//! ```toml
//! [backend]
//! url = "http://localhost:8000"
//!
//! [storage]
//! path = "./data/kbqa-storage.json"
//! bookmarks_key = "bookmarkedFiles"
//!
//! [session]
//! streaming = true
//! ```
//!
//! `KBQA_BACKEND_URL` overrides `backend.url`.

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kbqa_core::bookmarks::BOOKMARKS_KEY;

/// Environment variable overriding `backend.url`.
pub const BACKEND_URL_ENV: &str = "KBQA_BACKEND_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    #[serde(default = "default_bookmarks_key")]
    pub bookmarks_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            bookmarks_key: default_bookmarks_key(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/kbqa-storage.json")
}

fn default_bookmarks_key() -> String {
    BOOKMARKS_KEY.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Initial streaming preference for questions.
    #[serde(default = "default_streaming")]
    pub streaming: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            streaming: default_streaming(),
        }
    }
}

fn default_streaming() -> bool {
    true
}

impl Config {
    /// Parsed backend base URL. Valid after [`load_config`].
    pub fn backend_url(&self) -> Result<Url> {
        parse_backend_url(&self.backend.url)
    }
}

fn parse_backend_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid backend.url: '{}'", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("backend.url must use http or https, got '{}'", other),
    }
}

/// Load and validate the configuration at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str::<Config>(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        Config::default()
    };

    if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
        config.backend.url = url;
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    parse_backend_url(&config.backend.url)?;

    if config.storage.bookmarks_key.trim().is_empty() {
        bail!("storage.bookmarks_key must not be empty");
    }

    Ok(())
}
