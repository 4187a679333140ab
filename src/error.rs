use std::io;
use thiserror::Error;

/// Core error type for the selector and its surrounding plumbing.
#[derive(Error, Debug)]
pub enum ContextRankError {
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("git error: {message}")]
    Git { message: String },

    #[error("input error: {message}")]
    Input { message: String },

    #[error("empty diff: no hunks to select from")]
    EmptyDiff,

    #[error("budget infeasible: core set alone costs {cost} tokens against a budget of {budget}")]
    BudgetInfeasible { cost: usize, budget: usize },

    #[error("pipeline timed out after {elapsed_ms}ms (deadline {deadline_ms}ms)")]
    Timeout { elapsed_ms: u128, deadline_ms: u128 },

    #[error("internal invariant violated: {message}")]
    InternalInvariantViolation { message: String },

    #[error("command '{command}' is not yet implemented")]
    NotImplemented { command: String },
}

impl ContextRankError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InternalInvariantViolation {
            message: message.into(),
        }
    }

    pub fn not_implemented(command: impl Into<String>) -> Self {
        Self::NotImplemented {
            command: command.into(),
        }
    }

    /// True for errors that originate from user input or repository state
    /// rather than a bug in the pipeline itself.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath { .. }
                | Self::Validation { .. }
                | Self::Input { .. }
                | Self::EmptyDiff
                | Self::BudgetInfeasible { .. }
        )
    }

    /// True for errors where the pipeline degrades gracefully rather than
    /// aborting the run (spec §7 policy: only invariant violations halt).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Input { .. } | Self::BudgetInfeasible { .. } | Self::Timeout { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

pub type Result<T> = std::result::Result<T, ContextRankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ContextRankError::config("bad value");
        assert_eq!(err.to_string(), "config error: bad value");
    }

    #[test]
    fn not_implemented_display() {
        let err = ContextRankError::not_implemented("collect");
        assert_eq!(err.to_string(), "command 'collect' is not yet implemented");
    }

    #[test]
    fn budget_infeasible_display() {
        let err = ContextRankError::BudgetInfeasible {
            cost: 9000,
            budget: 5000,
        };
        assert!(err.to_string().contains("9000"));
        assert!(err.to_string().contains("5000"));
    }

    #[test]
    fn user_error_classification() {
        assert!(ContextRankError::invalid_path("/bad", "nope").is_user_error());
        assert!(ContextRankError::validation("field", "bad").is_user_error());
        assert!(ContextRankError::EmptyDiff.is_user_error());
        assert!(!ContextRankError::config("oops").is_user_error());
        assert!(!ContextRankError::not_implemented("x").is_user_error());
    }

    #[test]
    fn recoverable_classification() {
        assert!(ContextRankError::input("bad line number").is_recoverable());
        assert!(ContextRankError::BudgetInfeasible {
            cost: 1,
            budget: 0
        }
        .is_recoverable());
        assert!(!ContextRankError::invariant("E0 not subset of V").is_recoverable());
    }

    #[test]
    fn retryable_classification() {
        let io_err = ContextRankError::io("read", io::Error::new(io::ErrorKind::Other, "timeout"));
        assert!(io_err.is_retryable());
        assert!(!ContextRankError::config("nope").is_retryable());
    }
}
