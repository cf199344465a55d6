//! Error types for lhe-core

use thiserror::Error;

/// lhe-core error type
#[derive(Error, Debug)]
pub enum LheError {
    /// Malformed or missing configuration field.
    #[error("config error: {0}")]
    Config(String),

    /// Failure while compiling or evaluating a kinematic expression.
    #[error("expression error in '{expr}': {reason}")]
    Expression {
        /// Literal expression text as written in the configuration.
        expr: String,
        /// Underlying cause.
        reason: String,
    },

    /// Event file cannot be opened, parsed or counted.
    #[error("data error: {0}")]
    Data(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LheError {
    pub(crate) fn expression(expr: &str, reason: impl Into<String>) -> Self {
        LheError::Expression { expr: expr.to_string(), reason: reason.into() }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, LheError>;
