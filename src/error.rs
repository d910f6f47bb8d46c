//! Error types for odex operations.

use thiserror::Error;

use crate::binder::BindError;

/// Result type alias using [`OdexError`].
pub type Result<T> = std::result::Result<T, OdexError>;

/// Error types for odex operations.
#[derive(Debug, Error)]
pub enum OdexError {
    // ==================== Binding Errors ====================
    /// Binding error (clause compilation).
    #[error("Bind error: {0}")]
    Bind(BindError),

    // ==================== Model Errors ====================
    /// Schema-related errors (type not found, duplicate type, etc.).
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Model persistence errors.
    #[error("Model error: {0}")]
    ModelError(String),

    // ==================== Evaluation Errors ====================
    /// A member access or function call was evaluated against a null value.
    #[error("Null reference: {0}")]
    NullReference(String),

    /// Division by zero in expression evaluation.
    #[error("Division by zero")]
    DivisionByZero,

    /// Integer arithmetic overflowed its type.
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Invalid expression during evaluation (malformed tree or operand kind).
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// A host function registered by the caller failed.
    #[error("Function '{name}' failed: {message}")]
    FunctionFailed { name: String, message: String },
}

impl OdexError {
    /// Returns the binder error if this error was raised while compiling.
    #[must_use]
    pub fn as_bind_error(&self) -> Option<&BindError> {
        match self {
            OdexError::Bind(err) => Some(err),
            _ => None,
        }
    }
}
