//! Loader configuration
//!
//! Read from YAML (`.yml`/`.yaml`) or JSON (anything else). Every field is
//! optional. Relative `public_key` and `store_path` values are resolved
//! against the directory holding the config file.
//!
//! ```yaml
//! script_name: sw.js
//! script_url: https://example.com/app/
//! origin: https://example.com
//! store_path: state/records.json
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The one origin that runs without signature checks.
///
/// Deliberately implausible so that nobody serves a real site from it by
/// accident.
pub const DEBUG_ORIGIN: &str = "https://unsafe-website.do-not-trust:8000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Expected `metadata[0]`, also the resource fetched
    #[serde(default = "default_script_name")]
    pub script_name: String,

    /// Base URL the script is fetched from
    #[serde(default)]
    pub script_url: Option<String>,

    /// Origin the loader runs on
    #[serde(default)]
    pub origin: String,

    /// Title of the fixed error pages
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// Deadline for answering one intercepted request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Delay before a soft failure resets to loading
    #[serde(default = "default_soft_fail_reset_ms")]
    pub soft_fail_reset_ms: u64,

    /// Age after which a stored script is refreshed in the background
    #[serde(default = "default_refresh_after_days")]
    pub refresh_after_days: u32,

    /// Reject background refreshes that are not newer than the stored script
    #[serde(default)]
    pub enforce_refresh_min_mod_time: bool,

    /// P-384 public JWK replacing the embedded key
    #[serde(default)]
    pub public_key: Option<PathBuf>,

    /// Record store document; in-memory when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            script_name: default_script_name(),
            script_url: None,
            origin: String::new(),
            site_name: default_site_name(),
            request_timeout_ms: default_request_timeout_ms(),
            soft_fail_reset_ms: default_soft_fail_reset_ms(),
            refresh_after_days: default_refresh_after_days(),
            enforce_refresh_min_mod_time: false,
            public_key: None,
            store_path: None,
        }
    }
}

fn default_script_name() -> String {
    "sw.js".to_string()
}

fn default_site_name() -> String {
    "Signed Service Workers".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_soft_fail_reset_ms() -> u64 {
    5000
}

fn default_refresh_after_days() -> u32 {
    7
}

impl LoaderConfig {
    /// Load from a YAML or JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yml" | "yaml")
        );
        let mut config: LoaderConfig = if is_yaml {
            serde_yaml_ng::from_str(&content)
                .with_context(|| format!("Invalid YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON config: {}", path.display()))?
        };

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.public_key, &mut self.store_path]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Exact match only; no case folding, no subdomains
    pub fn is_debug_origin(&self) -> bool {
        self.origin == DEBUG_ORIGIN
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn soft_fail_reset(&self) -> Duration {
        Duration::from_millis(self.soft_fail_reset_ms)
    }

    pub fn refresh_after(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.refresh_after_days))
    }
}
