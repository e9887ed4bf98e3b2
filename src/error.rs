// src/error.rs

//! Error types shared by the query engine and the federation

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by sources, query plans and the federation
#[derive(Error, Debug)]
pub enum Error {
    /// A call against a source failed
    #[error("Source '{source_name}' failed: {message}")]
    SourceFailure {
        source_name: String,
        message: String,
    },

    /// An ordered merge was requested but the plan carries no ordering
    #[error("Aggregate queries require an ordering clause")]
    NoOrderingSpecified,

    /// A source cannot honor a clause pushed down to it
    #[error("Source '{source_name}' does not support clause: {clause}")]
    UnsupportedPlanClause {
        source_name: String,
        clause: String,
    },

    /// Version or version range could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Runtime resources (worker pool) could not be created
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Build a source failure from any displayable error
    pub fn source_failure(source_name: impl Into<String>, message: impl ToString) -> Self {
        Error::SourceFailure {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Errors that signal a programming or configuration mistake.
    ///
    /// These are never swallowed by the ignore-failures policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NoOrderingSpecified | Error::UnsupportedPlanClause { .. }
        )
    }

    /// Normalize an error raised by a source into a `SourceFailure`,
    /// leaving fatal errors and existing source failures untouched.
    pub(crate) fn into_source_failure(self, source_name: &str) -> Self {
        if self.is_fatal() || matches!(self, Error::SourceFailure { .. }) {
            self
        } else {
            Error::source_failure(source_name, self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::NoOrderingSpecified.is_fatal());
        assert!(
            Error::UnsupportedPlanClause {
                source_name: "remote".to_string(),
                clause: "order by title".to_string(),
            }
            .is_fatal()
        );
        assert!(!Error::source_failure("remote", "timeout").is_fatal());
    }

    #[test]
    fn test_into_source_failure_wraps_plain_errors() {
        let err = Error::ParseError("bad".to_string()).into_source_failure("local");
        match err {
            Error::SourceFailure {
                source_name,
                message,
            } => {
                assert_eq!(source_name, "local");
                assert_eq!(message, "Parse error: bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_into_source_failure_keeps_fatal_errors() {
        let err = Error::NoOrderingSpecified.into_source_failure("local");
        assert!(matches!(err, Error::NoOrderingSpecified));
    }
}
