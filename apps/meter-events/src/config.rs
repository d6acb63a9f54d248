use crate::ingest::{DEFAULT_GAP_THRESHOLD_MS, DEFAULT_WINDOW_MS};
use crate::render::OutputFormat;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration as ChronoDuration;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const MAX_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

const ENV_CONFIG_PATH: &str = "METER_EVENTS_CONFIG_PATH";
const ENV_WINDOW_MS: &str = "METER_EVENTS_WINDOW_MS";
const ENV_GAP_THRESHOLD_MS: &str = "METER_EVENTS_GAP_THRESHOLD_MS";
const ENV_OUTPUT: &str = "METER_EVENTS_OUTPUT";

/// Optional JSON settings file. Keys already set in the environment win.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsOverrides {
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub gap_threshold_ms: Option<u64>,
    #[serde(default)]
    pub output: Option<OutputFormat>,
}

/// Read a settings file the caller asked for by name. Any failure is an error.
pub fn read_settings_file(path: &Path) -> Result<SettingsOverrides> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let mut bytes = contents.into_bytes();
    simd_json::serde::from_slice(&mut bytes)
        .with_context(|| format!("failed to parse settings file {}", path.display()))
}

/// Settings file named by `METER_EVENTS_CONFIG_PATH`: problems are logged
/// and the env defaults are used instead.
pub fn load_settings_overrides(path: &Path) -> Option<SettingsOverrides> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "settings file not found; using defaults");
        return None;
    }
    match read_settings_file(path) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "meter-events failed to load settings file; using env defaults"
            );
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub window_ms: u64,
    pub gap_threshold_ms: u64,
    pub output: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS as u64,
            gap_threshold_ms: DEFAULT_GAP_THRESHOLD_MS as u64,
            output: OutputFormat::Text,
        }
    }
}

impl Config {
    /// Load `.env`, the process environment and the optional settings file.
    pub fn from_env(settings: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let overrides = match settings {
            Some(path) => Some(read_settings_file(path)?),
            None => env_optional(ENV_CONFIG_PATH)
                .map(PathBuf::from)
                .as_deref()
                .and_then(load_settings_overrides),
        };
        Self::from_sources(env_optional, overrides.as_ref())
    }

    pub fn from_sources<F>(lookup: F, overrides: Option<&SettingsOverrides>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(overrides) = overrides {
            if let Some(value) = overrides.window_ms {
                config.window_ms = value;
            }
            if let Some(value) = overrides.gap_threshold_ms {
                config.gap_threshold_ms = value;
            }
            if let Some(value) = overrides.output {
                config.output = value;
            }
        }

        if let Some(raw) = lookup(ENV_WINDOW_MS) {
            config.window_ms = parse_u64(ENV_WINDOW_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_GAP_THRESHOLD_MS) {
            config.gap_threshold_ms = parse_u64(ENV_GAP_THRESHOLD_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_OUTPUT) {
            config.output = raw
                .parse()
                .map_err(|err: String| anyhow!(err))
                .with_context(|| format!("invalid {ENV_OUTPUT}"))?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            bail!("window must be longer than 0 ms");
        }
        if self.window_ms > MAX_WINDOW_MS {
            bail!(
                "window of {} ms exceeds the {} ms maximum",
                self.window_ms,
                MAX_WINDOW_MS
            );
        }
        if self.gap_threshold_ms == 0 {
            bail!("gap threshold must be longer than 0 ms");
        }
        if self.gap_threshold_ms > MAX_WINDOW_MS {
            bail!(
                "gap threshold of {} ms exceeds the {} ms maximum",
                self.gap_threshold_ms,
                MAX_WINDOW_MS
            );
        }
        Ok(())
    }

    pub fn window_duration(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(self.window_ms.min(MAX_WINDOW_MS) as i64)
    }

    pub fn gap_threshold(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(self.gap_threshold_ms.min(MAX_WINDOW_MS) as i64)
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("invalid {key}"))
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
