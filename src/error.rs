//! Rich diagnostic error types for the sleepwalker.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives
//! next to the code that raises it. `SleepwalkerError` gathers them so the
//! binary can render any failure with its code and help text intact.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::experience::ExperienceError;
use crate::llm::GatewayError;
use crate::paths::PathError;
use crate::session::awake::AwakeError;
use crate::session::output::OutputError;

/// Top-level error type for the sleepwalker.
///
/// Filesystem exploration never appears here: the explorer absorbs its own
/// I/O failures and degrades to "no discovery".
#[derive(Debug, Error, Diagnostic)]
pub enum SleepwalkerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Paths(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Experience(#[from] ExperienceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Awake(#[from] AwakeError),

    #[error("failed to install signal handlers")]
    #[diagnostic(
        code(sleepwalker::signals),
        help("The process could not register SIGINT/SIGTERM handlers. Graceful shutdown is unavailable.")
    )]
    Signals {
        #[source]
        source: std::io::Error,
    },
}

pub type SleepwalkerResult<T> = std::result::Result<T, SleepwalkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_errors_keep_their_diagnostic_code() {
        let err: SleepwalkerError = ConfigError::Invalid {
            field: "explorer.max_depth".into(),
            message: "must be at least 1".into(),
        }
        .into();
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("sleepwalker::config::invalid"));
        assert!(err.to_string().contains("explorer.max_depth"));
    }
}
