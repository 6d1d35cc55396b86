use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.ecmwf.int/v1";
pub const RC_FILE_NAME: &str = ".ecmwfapirc";

/// API access key for the ECMWF Web API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(default = "default_url")]
    pub url: String,
    pub key: String,
    pub email: String,
}

fn default_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Credentials {
    pub fn new(url: impl Into<String>, key: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            email: email.into(),
        }
    }

    /// Resolve credentials from the process environment and the user's rc file.
    pub fn from_env() -> Result<Self> {
        Self::resolve(|name| std::env::var(name).ok(), dirs::home_dir())
    }

    /// Resolution order: `ECMWF_API_KEY`/`ECMWF_API_URL`/`ECMWF_API_EMAIL` (all three),
    /// then the rc file at `ECMWF_API_RC_FILE`, then `<home>/.ecmwfapirc`.
    pub fn resolve(
        env: impl Fn(&str) -> Option<String>,
        home: Option<PathBuf>,
    ) -> Result<Self> {
        if let (Some(key), Some(url), Some(email)) = (
            env("ECMWF_API_KEY"),
            env("ECMWF_API_URL"),
            env("ECMWF_API_EMAIL"),
        ) {
            return Ok(Self::new(url, key, email));
        }

        let rc = env("ECMWF_API_RC_FILE")
            .map(PathBuf::from)
            .or_else(|| home.map(|h| h.join(RC_FILE_NAME)));

        match rc {
            Some(path) if path.exists() => Self::from_rc_file(&path),
            Some(path) => Err(Error::MissingCredentials(path.display().to_string())),
            None => Err(Error::MissingCredentials(format!("~/{RC_FILE_NAME}"))),
        }
    }

    /// Read a JSON rc file: `{"url": ..., "key": ..., "email": ...}`.
    pub fn from_rc_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut creds: Credentials = serde_json::from_str(&text)?;
        creds.url = creds.url.trim_end_matches('/').to_string();
        Ok(creds)
    }
}

/// Knobs for polling, retries and transfers.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Sleep between polls until the server sends `Retry-After`.
    pub poll_interval: Duration,
    pub transient_retries: u32,
    pub transient_backoff: Duration,
    pub transfer_retries: u32,
    pub transfer_backoff: Duration,
    pub verify_tls: bool,
    pub page_limit: u32,
    pub show_news: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            transient_retries: 10,
            transient_backoff: Duration::from_secs(60),
            transfer_retries: 10,
            transfer_backoff: Duration::from_secs(60),
            verify_tls: true,
            page_limit: 500,
            show_news: true,
        }
    }
}
