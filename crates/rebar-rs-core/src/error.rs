//! Core error types for rebar-rs.
//!
//! [`ValidationError`] is what validators and `clean` hooks raise; it can carry
//! one message or many. [`RebarError`] is the crate-wide error enum covering
//! validation, construction, lookup, and persistence failures.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// A validation failure carrying one or more messages.
///
/// Mirrors Django's `ValidationError`: it may be raised with a single message
/// (and an error code), or with a list of messages collected from several
/// checks. [`messages`](ValidationError::messages) flattens either form.
///
/// # Examples
///
/// ```
/// use rebar_rs_core::error::ValidationError;
///
/// let err = ValidationError::new("This field is required.", "required");
/// assert_eq!(err.messages(), vec!["This field is required.".to_string()]);
///
/// let err = ValidationError::from_messages(vec!["Too short.".into(), "Not unique.".into()]);
/// assert_eq!(err.messages().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the type of validation failure (e.g. "required", "invalid").
    pub code: String,
    /// Additional parameters providing context for the error message.
    pub params: HashMap<String, String>,
    /// Further errors raised together with this one.
    pub errors: Vec<Self>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Creates a `ValidationError` with the code `"invalid"`.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(message, "invalid")
    }

    /// Creates a compound `ValidationError` from a list of messages.
    pub fn from_messages(messages: Vec<String>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            params: HashMap::new(),
            errors: messages.into_iter().map(Self::invalid).collect(),
        }
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Returns every message carried by this error, flattened in order.
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.message.is_empty() {
            out.push(self.message.clone());
        }
        for nested in &self.errors {
            out.extend(nested.messages());
        }
        out
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}

impl std::error::Error for ValidationError {}

impl From<Vec<String>> for ValidationError {
    fn from(messages: Vec<String>) -> Self {
        Self::from_messages(messages)
    }
}

/// The primary error type for rebar-rs.
///
/// Validation failures of members are never surfaced through this type; they
/// are collected into error containers. `RebarError` covers what must fail
/// loudly: bad declarations, lookups of unknown members or states, and
/// persistence problems.
#[derive(Error, Debug)]
pub enum RebarError {
    // ── Validation ───────────────────────────────────────────────────

    /// One or more values failed validation.
    #[error("Validation error: {0}")]
    Validation(ValidationError),

    // ── Construction ─────────────────────────────────────────────────

    /// A group, member, or validator was declared or constructed incorrectly.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Lookup ───────────────────────────────────────────────────────

    /// No member with the given name exists in the group.
    #[error("No member named '{0}'")]
    MemberNotFound(String),

    /// A member index was past the end of the group.
    #[error("Member index {index} out of range for a group of {len}")]
    MemberIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The number of members in the group.
        len: usize,
    },

    /// No state validator is registered for the given state.
    #[error("No state validator for state '{0}'")]
    UnknownState(String),

    // ── Persistence ──────────────────────────────────────────────────

    /// A relation was saved before its parent record had an identity.
    #[error("Record must be saved before '{0}' can be saved")]
    NotSaved(String),

    /// The persistence layer rejected an operation.
    #[error("Persistence error: {0}")]
    Persistence(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A settings value is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for RebarError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

/// A convenience type alias for `Result<T, RebarError>`.
pub type RebarResult<T> = Result<T, RebarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_simple() {
        let err = ValidationError::new("This field is required.", "required");
        assert_eq!(err.to_string(), "This field is required.");
    }

    #[test]
    fn test_validation_error_messages_flatten_nested() {
        let mut err = ValidationError::new("Outer.", "outer");
        err.errors.push(ValidationError::from_messages(vec![
            "First.".into(),
            "Second.".into(),
        ]));
        assert_eq!(err.messages(), vec!["Outer.", "First.", "Second."]);
        assert_eq!(err.to_string(), "Outer.; First.; Second.");
    }

    #[test]
    fn test_validation_error_from_messages_has_no_primary() {
        let err: ValidationError = vec!["a".to_string(), "b".to_string()].into();
        assert!(err.message.is_empty());
        assert_eq!(err.messages(), vec!["a", "b"]);
    }

    #[test]
    fn test_validation_error_with_param() {
        let err = ValidationError::new("Too short.", "min_length").with_param("min", "8");
        assert_eq!(err.params.get("min").map(String::as_str), Some("8"));
    }

    #[test]
    fn test_rebar_error_display() {
        assert_eq!(
            RebarError::MemberNotFound("email".into()).to_string(),
            "No member named 'email'"
        );
        assert_eq!(
            RebarError::MemberIndexOutOfRange { index: 3, len: 2 }.to_string(),
            "Member index 3 out of range for a group of 2"
        );
        assert_eq!(
            RebarError::UnknownState("published".into()).to_string(),
            "No state validator for state 'published'"
        );
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: RebarError = ValidationError::invalid("bad").into();
        assert!(matches!(err, RebarError::Validation(_)));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: RebarError = io_err.into();
        assert!(err.to_string().contains("file missing"));
    }
}
