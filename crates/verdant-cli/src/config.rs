// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_VISION_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_VISION_MODEL: &str = "llava";
const DEFAULT_TIMEOUT: &str = "30s";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub vision: Vision,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            sync: SyncSettings::default(),
            vision: Vision::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
    pub fallback_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub user_id: Option<String>,
    pub token: Option<String>,
    pub timeout: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: Some(false),
            base_url: None,
            user_id: None,
            token: None,
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vision {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Vision {
    fn default() -> Self {
        Self {
            enabled: Some(true),
            base_url: Some(DEFAULT_VISION_BASE_URL.to_owned()),
            api_key: Some(String::new()),
            model: Some(DEFAULT_VISION_MODEL.to_owned()),
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("VERDANT_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set VERDANT_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(verdant_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and move values under [storage], [sync], and [vision]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            verdant_db::validate_db_path(db_path)?;
        }

        for (section, timeout) in [
            ("sync", self.sync.timeout.as_deref()),
            ("vision", self.vision.timeout.as_deref()),
        ] {
            if let Some(timeout) = timeout {
                let parsed = parse_duration(timeout)?;
                if parsed <= Duration::ZERO {
                    bail!(
                        "{section}.timeout in {} must be positive, got {}",
                        path.display(),
                        timeout
                    );
                }
            }
        }

        if self.sync_enabled() && self.sync.base_url.as_deref().unwrap_or("").is_empty() {
            bail!(
                "[sync] is enabled in {} but sync.base_url is missing",
                path.display()
            );
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => verdant_db::default_db_path(),
        }
    }

    pub fn fallback_path(&self, db_path: &Path) -> PathBuf {
        match &self.storage.fallback_path {
            Some(path) => PathBuf::from(path),
            None => verdant_db::default_fallback_path(db_path),
        }
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync.enabled.unwrap_or(false)
    }

    pub fn sync_base_url(&self) -> &str {
        self.sync.base_url.as_deref().unwrap_or("").trim_end_matches('/')
    }

    pub fn sync_user_id(&self) -> Option<&str> {
        self.sync
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn sync_token(&self) -> &str {
        self.sync.token.as_deref().unwrap_or("")
    }

    pub fn sync_timeout(&self) -> Result<Duration> {
        parse_duration(self.sync.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn vision_enabled(&self) -> bool {
        self.vision.enabled.unwrap_or(true)
    }

    pub fn vision_base_url(&self) -> &str {
        self.vision
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_VISION_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn vision_api_key(&self) -> &str {
        self.vision.api_key.as_deref().unwrap_or("")
    }

    pub fn vision_model(&self) -> &str {
        self.vision.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL)
    }

    pub fn vision_timeout(&self) -> Result<Duration> {
        parse_duration(self.vision.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# verdant config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/verdant/verdant.db)\n# db_path = \"/absolute/path/to/verdant.db\"\n# fallback_path = \"/absolute/path/to/verdant.fallback.json\"\n\n[sync]\nenabled = false\n# base_url = \"https://api.example.com/v1\"\n# user_id = \"your-account-id\"\n# token = \"paste-session-token\"\ntimeout = \"{}\"\n\n[vision]\nenabled = true\nbase_url = \"{}\"\napi_key = \"\"\nmodel = \"{}\"\ntimeout = \"{}\"\n",
            path.display(),
            DEFAULT_TIMEOUT,
            DEFAULT_VISION_BASE_URL,
            DEFAULT_VISION_MODEL,
            DEFAULT_TIMEOUT,
        )
    }
}

pub fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 30s)")
}
