use std::{collections::HashMap, fs, path::Path};

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;

/// Connection parameters for the identity/storage backend.
///
/// Both values are required; any storage or identity operation without them
/// is a fatal startup condition, so loading fails instead of defaulting.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
}

pub const CONFIG_FILE: &str = "photowall.toml";
pub const ENV_API_URL: &str = "PHOTOWALL_API_URL";
pub const ENV_API_KEY: &str = "PHOTOWALL_API_KEY";

impl Settings {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
        .validated()
    }

    fn validated(mut self) -> anyhow::Result<Self> {
        self.api_url = self.api_url.trim().trim_end_matches('/').to_string();
        self.api_key = self.api_key.trim().to_string();
        if self.api_url.is_empty() {
            bail!("missing backend endpoint URL (set {ENV_API_URL} or api_url in {CONFIG_FILE})");
        }
        let parsed = Url::parse(&self.api_url)
            .with_context(|| format!("invalid backend endpoint URL '{}'", self.api_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "backend endpoint URL must use http or https, got '{}'",
                self.api_url
            );
        }
        if self.api_key.is_empty() {
            bail!("missing public API key (set {ENV_API_KEY} or api_key in {CONFIG_FILE})");
        }
        Ok(self)
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(CONFIG_FILE))
}

/// Precedence: config file, then environment overrides.
pub fn load_settings_from(config_path: &Path) -> anyhow::Result<Settings> {
    let mut api_url = String::new();
    let mut api_key = String::new();

    if let Ok(raw) = fs::read_to_string(config_path) {
        let file_cfg: HashMap<String, String> = toml::from_str(&raw)
            .with_context(|| format!("malformed config file '{}'", config_path.display()))?;
        if let Some(v) = file_cfg.get("api_url") {
            api_url = v.clone();
        }
        if let Some(v) = file_cfg.get("api_key") {
            api_key = v.clone();
        }
    }

    if let Ok(v) = std::env::var(ENV_API_URL) {
        api_url = v;
    }
    if let Ok(v) = std::env::var(ENV_API_KEY) {
        api_key = v;
    }

    Settings { api_url, api_key }.validated()
}
