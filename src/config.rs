//! TOML configuration for the relipredict service and CLI.
//!
//! Every section falls back to compiled-in defaults, so an empty file (or no
//! file at all) is a valid configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{BpConfig, FitOptions, GammaPrior, WalkForward};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "RELIPREDICT_CONFIG";

/// Standard system location checked after the environment override.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/relipredict/relipredict.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fitting: FittingConfig,
    #[serde(default)]
    pub narrative: NarrativeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the configuration in order:
    /// 1. An explicit path (the `--config` flag). Errors here are fatal.
    /// 2. The path in `RELIPREDICT_CONFIG`.
    /// 3. `/etc/relipredict/relipredict.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Steps 2 to 4 of [`Config::resolve`]. Unreadable files are logged and
    /// skipped.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "RELIPREDICT_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingConfig {
    /// Concurrent model fits. 0 means one per available CPU.
    pub workers: usize,
    pub train_ratio: f64,
    /// Models fitted when a request does not name any.
    pub algorithms: Vec<String>,
    pub bayesian_prior: GammaPrior,
    pub bp: BpConfig,
    /// Walk-forward validation on every request; off unless the table is present.
    pub walk_forward: Option<WalkForward>,
    pub interval_alpha: Option<f64>,
}

impl FittingConfig {
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            bayesian_prior: self.bayesian_prior,
            bp: self.bp,
            walk_forward: self.walk_forward,
            interval_alpha: self.interval_alpha,
        }
    }
}

impl Default for FittingConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            train_ratio: 0.7,
            algorithms: ["GO", "JM", "Statistical", "Bayesian"]
                .into_iter()
                .map(String::from)
                .collect(),
            bayesian_prior: GammaPrior::default(),
            bp: BpConfig::default(),
            walk_forward: None,
            interval_alpha: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Narrative
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat completion service used for report narratives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lives in the config file.
    pub api_key_env: String,
    /// Deadline for the whole narrative request, in seconds.
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            timeout_secs: 60,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
