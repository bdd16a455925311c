//! XDG-style path resolution for the sleepwalker.
//!
//! Configuration follows `$XDG_CONFIG_HOME/sleepwalker/`; generated dreams
//! default to `~/.sleepwalker/dreams` so they are easy to find.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(sleepwalker::paths::no_home),
        help("Set the HOME environment variable or pass --output-dir and --dirs explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(sleepwalker::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Well-known locations used by the sleepwalker.
#[derive(Debug, Clone)]
pub struct SleepwalkerPaths {
    /// The user's home directory.
    pub home: PathBuf,
    /// `$XDG_CONFIG_HOME/sleepwalker/`
    pub config_dir: PathBuf,
}

impl SleepwalkerPaths {
    /// Resolve directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("sleepwalker");

        Ok(Self { home, config_dir })
    }

    /// Path to the global config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Where dreams are written unless configured otherwise.
    pub fn default_output_dir(&self) -> PathBuf {
        default_output_dir_in(&self.home)
    }

    /// Directories explored when none are given: Desktop and Documents.
    pub fn default_allowed_dirs(&self) -> Vec<PathBuf> {
        default_allowed_dirs_in(&self.home)
    }

    /// Create the config directory. Idempotent.
    pub fn ensure_config_dir(&self) -> PathResult<()> {
        ensure_dir(&self.config_dir)
    }
}

/// Best-effort home directory for serde defaults, which cannot fail.
pub(crate) fn home_or_cwd() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

pub(crate) fn default_output_dir_in(home: &Path) -> PathBuf {
    home.join(".sleepwalker").join("dreams")
}

pub(crate) fn default_allowed_dirs_in(home: &Path) -> Vec<PathBuf> {
    vec![home.join("Desktop"), home.join("Documents")]
}

/// Expand a leading `~` or `~/` against `home`. Other paths, including
/// `~user/...`, are returned unchanged.
pub fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home.to_path_buf(),
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Create a directory and its parents, mapping the failure into a [`PathError`].
pub fn ensure_dir(dir: &Path) -> PathResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
        path: dir.display().to_string(),
        source: e,
    })
}
