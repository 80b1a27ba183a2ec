//! Network script source over HTTP(S)
//!
//! Any non-success status is a definite "not found"; transport failures are
//! network errors.

use super::{ScriptSource, SourceError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub struct HttpSource {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpSource {
    /// `base_url` is the directory the script is served from; the script
    /// name is resolved against it.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = reqwest::Url::parse(base_url)
            .with_context(|| format!("Invalid script URL: {base_url}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub fn url_for(&self, name: &str) -> Result<reqwest::Url> {
        self.base_url
            .join(name)
            .with_context(|| format!("Cannot resolve '{name}' against {}", self.base_url))
    }
}

#[async_trait]
impl ScriptSource for HttpSource {
    async fn fetch(&self, name: &str) -> Result<String, SourceError> {
        let network = |message: String| SourceError::Network {
            name: name.to_string(),
            message,
        };

        let url = self.url_for(name).map_err(|e| network(format!("{e:#}")))?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::NotFound {
                name: name.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|e| network(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
