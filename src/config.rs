//! Sleepwalker configuration, persisted as TOML.
//!
//! Every field has a serde default, so a partial (or missing) file yields a
//! usable configuration. CLI flags are applied on top of the loaded values.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::experience::ExperienceMode;
use crate::explore::ExplorerConfig;
use crate::llm::LlmRequestConfig;
use crate::llm::backoff::MAX_DELAY_SECS;
use crate::paths;
use crate::session::SessionConfig;

/// Errors from loading, saving, or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(sleepwalker::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(sleepwalker::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(sleepwalker::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {message}")]
    #[diagnostic(code(sleepwalker::config::serialize))]
    Serialize { message: String },

    #[error("invalid config value for {field}: {message}")]
    #[diagnostic(
        code(sleepwalker::config::invalid),
        help("Fix the value in the config file or on the command line.")
    )]
    Invalid { field: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// The complete sleepwalker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepwalkerConfig {
    /// Directories the explorer may traverse.
    #[serde(default = "default_allowed_dirs")]
    pub allowed_dirs: Vec<PathBuf>,
    /// Where dream artifacts are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Which experience to produce.
    #[serde(default)]
    pub mode: ExperienceMode,
    /// Seconds of inactivity required before a cycle starts (0 = always proceed).
    #[serde(default)]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub llm: LlmRequestConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_allowed_dirs() -> Vec<PathBuf> {
    paths::default_allowed_dirs_in(&paths::home_or_cwd())
}

fn default_output_dir() -> PathBuf {
    paths::default_output_dir_in(&paths::home_or_cwd())
}

impl Default for SleepwalkerConfig {
    fn default() -> Self {
        Self {
            allowed_dirs: default_allowed_dirs(),
            output_dir: default_output_dir(),
            mode: ExperienceMode::default(),
            idle_timeout_secs: 0,
            explorer: ExplorerConfig::default(),
            llm: LlmRequestConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl SleepwalkerConfig {
    /// Load config from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Parse config from a TOML string. Paths starting with `~/` are
    /// expanded against the home directory.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        let mut config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        config.expand_home(&paths::home_or_cwd());
        Ok(config)
    }

    fn expand_home(&mut self, home: &Path) {
        self.output_dir = paths::expand_home(&self.output_dir, home);
        for dir in &mut self.allowed_dirs {
            *dir = paths::expand_home(dir, home);
        }
    }

    /// Render config as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            message: e.to_string(),
        })
    }

    /// Save config to a TOML file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject values the explorer, gateway, or orchestrator cannot honor.
    pub fn validate(&self) -> ConfigResult<()> {
        let ex = &self.explorer;
        if ex.max_depth == 0 {
            return Err(invalid("explorer.max_depth", "must be at least 1"));
        }
        check_probability("explorer.directory_pick_probability", ex.directory_pick_probability)?;
        check_probability(
            "explorer.prefer_unvisited_probability",
            ex.prefer_unvisited_probability,
        )?;
        if ex.attempts_per_wander == 0 {
            return Err(invalid("explorer.attempts_per_wander", "must be at least 1"));
        }
        if ex.min_preview_size > ex.max_preview_size {
            return Err(invalid(
                "explorer.min_preview_size",
                "must not exceed explorer.max_preview_size",
            ));
        }

        let llm = &self.llm;
        if llm.primary_model.trim().is_empty() {
            return Err(invalid("llm.primary_model", "must not be empty"));
        }
        if let Some(t) = llm.temperature {
            check_probability("llm.temperature", f64::from(t))?;
        }
        if llm.retry.max_attempts == 0 {
            return Err(invalid("llm.retry.max_attempts", "must be at least 1"));
        }
        if !(llm.retry.multiplier.is_finite() && llm.retry.multiplier >= 1.0) {
            return Err(invalid("llm.retry.multiplier", "must be a finite number >= 1.0"));
        }
        check_delay("llm.retry.base_delay_secs", llm.retry.base_delay_secs)?;
        check_delay("llm.retry.max_delay_secs", llm.retry.max_delay_secs)?;
        if llm.retry.base_delay_secs > llm.retry.max_delay_secs {
            return Err(invalid(
                "llm.retry.base_delay_secs",
                "must not exceed llm.retry.max_delay_secs",
            ));
        }

        let s = &self.session;
        if s.min_items == 0 || s.min_items > s.max_items {
            return Err(invalid(
                "session.min_items",
                "must be at least 1 and not exceed session.max_items",
            ));
        }
        if s.min_rest_secs > s.max_rest_secs {
            return Err(invalid(
                "session.min_rest_secs",
                "must not exceed session.max_rest_secs",
            ));
        }
        check_probability("session.subdirectory_probability", s.subdirectory_probability)?;
        if s.prune_every == 0 {
            return Err(invalid("session.prune_every", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.into(),
        message: message.into(),
    }
}

fn check_probability(field: &str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, &format!("{value} is outside [0, 1]")))
    }
}

fn check_delay(field: &str, value: f64) -> ConfigResult<()> {
    if (0.0..=MAX_DELAY_SECS).contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            field,
            &format!("{value} is outside [0, {MAX_DELAY_SECS}] seconds"),
        ))
    }
}
