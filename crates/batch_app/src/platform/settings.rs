use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use batch_engine::EngineConfig;
use engine_logging::{engine_debug, engine_info};
use serde::{Deserialize, Serialize};

use crate::cli::Args;

/// Looked up in the working directory when `--settings` is not given.
pub(crate) const DEFAULT_SETTINGS_FILENAME: &str = "batch_settings.ron";

/// Optional overrides read from a RON file. Unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub email: Option<String>,
    pub max_workers: Option<usize>,
    pub post_timeout_secs: Option<u64>,
    pub get_timeout_secs: Option<u64>,
    pub downloads_root: Option<PathBuf>,
    pub download_dir: Option<String>,
    pub module_name: Option<String>,
    pub link_prefix: Option<String>,
    pub redact_keys: Option<Vec<String>>,
    pub required_fields: Vec<String>,
    pub retry_delay_ms: Option<u64>,
}

/// An explicitly named file must exist; the default one may be absent.
pub(crate) fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_SETTINGS_FILENAME), false),
    };

    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
            engine_debug!("No settings file at {:?}; using defaults", path);
            return Ok(Settings::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read settings from {path:?}"));
        }
    };

    let settings: Settings = ron::from_str(&content)
        .with_context(|| format!("failed to parse settings from {path:?}"))?;
    engine_info!("Loaded settings from {:?}", path);
    Ok(settings)
}

/// Values taken from the process environment (after `.env` is loaded).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EnvOverrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub email: Option<String>,
    pub post_timeout_secs: Option<u64>,
    pub get_timeout_secs: Option<u64>,
    pub max_workers: Option<usize>,
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let number = |key: &str| -> Result<Option<u64>> {
            text(key)
                .map(|value| {
                    value
                        .parse::<u64>()
                        .with_context(|| format!("{key} must be a whole number, got {value:?}"))
                })
                .transpose()
        };

        Ok(Self {
            base_url: text("URL"),
            api_key: text("API_KEY"),
            email: text("MAIL"),
            post_timeout_secs: number("TIMEOUT_POST")?,
            get_timeout_secs: number("TIMEOUT_GET")?,
            max_workers: number("MAX_WORKERS")?.map(|n| n as usize),
        })
    }
}

/// Defaults, then the settings file, then the environment, then flags.
pub(crate) fn build_config(settings: &Settings, env: &EnvOverrides, args: &Args) -> Result<EngineConfig> {
    let mut config = EngineConfig::default();

    apply(&mut config.base_url, settings.base_url.clone());
    apply(&mut config.api_key, settings.api_key.clone());
    apply(&mut config.email, settings.email.clone());
    apply(&mut config.max_workers, settings.max_workers);
    apply(&mut config.post_timeout, settings.post_timeout_secs.map(Duration::from_secs));
    apply(&mut config.get_timeout, settings.get_timeout_secs.map(Duration::from_secs));
    apply(&mut config.downloads_root, settings.downloads_root.clone());
    apply(&mut config.module_name, settings.module_name.clone());
    apply(&mut config.link_prefix, settings.link_prefix.clone());
    apply(&mut config.redact_keys, settings.redact_keys.clone());
    apply(&mut config.retry_delay, settings.retry_delay_ms.map(Duration::from_millis));
    config.download_dir = settings.download_dir.clone();
    config.required_fields = settings.required_fields.clone();

    apply(&mut config.base_url, env.base_url.clone());
    apply(&mut config.api_key, env.api_key.clone());
    apply(&mut config.email, env.email.clone());
    apply(&mut config.post_timeout, env.post_timeout_secs.map(Duration::from_secs));
    apply(&mut config.get_timeout, env.get_timeout_secs.map(Duration::from_secs));
    apply(&mut config.max_workers, env.max_workers);

    apply(&mut config.base_url, args.base_url.clone());
    apply(&mut config.max_workers, args.workers);
    apply(&mut config.downloads_root, args.downloads_root.clone());
    apply(&mut config.module_name, args.module.clone());
    if args.download_dir.is_some() {
        config.download_dir = args.download_dir.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}
