//! Top-level error type for the CLI and library entry points.
//!
//! Stage failures arrive as [`crate::bundler::Error`] and keep their own
//! message; this layer only adds CLI and manifest errors around them.

use crate::bundler::ErrorCategory;
use thiserror::Error;

/// Result type alias for bundler operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Main error type for all bundler operations
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Bundler(#[from] crate::bundler::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl BundlerError {
    /// Classifies this error the way the stage errors are classified.
    pub fn category(&self) -> ErrorCategory {
        match self {
            BundlerError::Cli(_) | BundlerError::Toml(_) => ErrorCategory::Configuration,
            BundlerError::Io(_) => ErrorCategory::Io,
            BundlerError::Bundler(e) => e.category(),
        }
    }

    /// Whether re-running the same command can pick up where this one stopped.
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Interrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_notarization_is_recoverable() {
        let err = BundlerError::from(crate::bundler::Error::NotarizationInterrupted {
            submission_id: "abc".into(),
        });
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("--resume abc"));
    }

    #[test]
    fn cli_errors_are_configuration() {
        let err = BundlerError::from(CliError::InvalidArguments {
            reason: "nope".into(),
        });
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(!err.is_recoverable());
    }
}
