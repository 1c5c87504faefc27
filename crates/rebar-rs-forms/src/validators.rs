//! Value validators.
//!
//! A [`Validator`] checks one constraint on a [`Value`] and raises a
//! [`ValidationError`] when it does not hold. Validators are attached to form
//! fields and are the building blocks of
//! [`StateValidator`](crate::state::StateValidator) rules.
//!
//! Length and range validators ignore values of the wrong type; pair them with
//! [`RequiredValidator`] when absence must fail too.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use rebar_rs_core::ValidationError;

use crate::value::Value;

/// Message raised by [`RequiredValidator`].
pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// Pattern shared by the email validator and email form fields.
pub(crate) static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});

/// A trait for validating values.
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::validators::{MaxLengthValidator, Validator};
/// use rebar_rs_forms::value::Value;
///
/// let v = MaxLengthValidator::new(5);
/// assert!(v.validate(&Value::from("hi")).is_ok());
/// assert!(v.validate(&Value::from("toolong")).is_err());
/// ```
pub trait Validator: Send + Sync + fmt::Debug {
    /// Validates the given value, returning an error if invalid.
    fn validate(&self, value: &Value) -> Result<(), ValidationError>;

    /// Returns a human-readable name for this validator.
    fn name(&self) -> &str;
}

/// A shared, immutable validator.
pub type SharedValidator = Arc<dyn Validator>;

/// Fails on empty values (`Null`, `""`, empty list).
#[derive(Debug, Clone)]
pub struct RequiredValidator {
    message: String,
}

impl RequiredValidator {
    /// Creates a `RequiredValidator` with the default message.
    pub fn new() -> Self {
        Self::with_message(REQUIRED_MESSAGE)
    }

    /// Creates a `RequiredValidator` raising `message`.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for RequiredValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for RequiredValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if value.is_empty_value() {
            return Err(ValidationError::new(self.message.clone(), "required"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "RequiredValidator"
    }
}

/// Validates that a string value does not exceed a maximum length.
#[derive(Debug, Clone)]
pub struct MaxLengthValidator {
    /// The maximum allowed length, in characters.
    pub max_length: usize,
}

impl MaxLengthValidator {
    /// Creates a new `MaxLengthValidator` with the given maximum length.
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Validator for MaxLengthValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if let Value::String(s) = value {
            let len = s.chars().count();
            if len > self.max_length {
                return Err(ValidationError::new(
                    format!(
                        "Ensure this value has at most {} characters (it has {len}).",
                        self.max_length
                    ),
                    "max_length",
                )
                .with_param("limit_value", self.max_length.to_string()));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MaxLengthValidator"
    }
}

/// Validates that a string value meets a minimum length.
#[derive(Debug, Clone)]
pub struct MinLengthValidator {
    /// The minimum required length, in characters.
    pub min_length: usize,
}

impl MinLengthValidator {
    /// Creates a new `MinLengthValidator` with the given minimum length.
    pub const fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Validator for MinLengthValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if let Value::String(s) = value {
            let len = s.chars().count();
            if len < self.min_length {
                return Err(ValidationError::new(
                    format!(
                        "Ensure this value has at least {} characters (it has {len}).",
                        self.min_length
                    ),
                    "min_length",
                )
                .with_param("limit_value", self.min_length.to_string()));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MinLengthValidator"
    }
}

#[allow(clippy::cast_precision_loss)]
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Validates that a numeric value does not exceed a maximum.
#[derive(Debug, Clone)]
pub struct MaxValueValidator {
    /// The maximum allowed value.
    pub max_value: f64,
}

impl MaxValueValidator {
    /// Creates a new `MaxValueValidator` with the given maximum.
    pub fn new(max_value: f64) -> Self {
        Self { max_value }
    }
}

impl Validator for MaxValueValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match numeric(value) {
            Some(n) if n > self.max_value => Err(ValidationError::new(
                format!(
                    "Ensure this value is less than or equal to {}.",
                    self.max_value
                ),
                "max_value",
            )),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MaxValueValidator"
    }
}

/// Validates that a numeric value meets a minimum.
#[derive(Debug, Clone)]
pub struct MinValueValidator {
    /// The minimum required value.
    pub min_value: f64,
}

impl MinValueValidator {
    /// Creates a new `MinValueValidator` with the given minimum.
    pub fn new(min_value: f64) -> Self {
        Self { min_value }
    }
}

impl Validator for MinValueValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match numeric(value) {
            Some(n) if n < self.min_value => Err(ValidationError::new(
                format!(
                    "Ensure this value is greater than or equal to {}.",
                    self.min_value
                ),
                "min_value",
            )),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MinValueValidator"
    }
}

/// Validates that a string value matches a regular expression.
#[derive(Debug, Clone)]
pub struct RegexValidator {
    regex: Regex,
    message: String,
}

impl RegexValidator {
    /// Creates a `RegexValidator`, failing if `pattern` does not compile.
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            message: message.into(),
        })
    }
}

impl Validator for RegexValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if let Value::String(s) = value {
            if !self.regex.is_match(s) {
                return Err(ValidationError::new(self.message.clone(), "invalid"));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "RegexValidator"
    }
}

/// Validates that a non-empty string value looks like an email address.
#[derive(Debug, Clone, Default)]
pub struct EmailValidator;

impl Validator for EmailValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        if let Value::String(s) = value {
            if !s.is_empty() && !EMAIL_RE.is_match(s) {
                return Err(ValidationError::new(
                    "Enter a valid email address.",
                    "invalid",
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "EmailValidator"
    }
}

/// Adapts a closure into a [`Validator`].
pub struct FnValidator<F> {
    name: String,
    func: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync,
{
    /// Wraps `func` under `name`.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator").field("name", &self.name).finish()
    }
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        (self.func)(value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ── Shorthand constructors ─────────────────────────────────────────────

/// A shared [`RequiredValidator`].
pub fn required() -> SharedValidator {
    Arc::new(RequiredValidator::new())
}

/// A shared [`MaxLengthValidator`].
pub fn max_length(max: usize) -> SharedValidator {
    Arc::new(MaxLengthValidator::new(max))
}

/// A shared [`MinLengthValidator`].
pub fn min_length(min: usize) -> SharedValidator {
    Arc::new(MinLengthValidator::new(min))
}

/// A shared [`MaxValueValidator`].
pub fn max_value(max: f64) -> SharedValidator {
    Arc::new(MaxValueValidator::new(max))
}

/// A shared [`MinValueValidator`].
pub fn min_value(min: f64) -> SharedValidator {
    Arc::new(MinValueValidator::new(min))
}

/// A shared [`EmailValidator`].
pub fn email() -> SharedValidator {
    Arc::new(EmailValidator)
}

/// A shared [`FnValidator`].
pub fn from_fn<F>(name: impl Into<String>, func: F) -> SharedValidator
where
    F: Fn(&Value) -> Result<(), ValidationError> + Send + Sync + 'static,
{
    Arc::new(FnValidator::new(name, func))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        let v = RequiredValidator::new();
        assert!(v.validate(&Value::from("x")).is_ok());
        assert!(v.validate(&Value::Int(0)).is_ok());
        let err = v.validate(&Value::Null).unwrap_err();
        assert_eq!(err.message, REQUIRED_MESSAGE);
        assert_eq!(err.code, "required");
        assert!(v.validate(&Value::from("")).is_err());
    }

    #[test]
    fn test_required_custom_message() {
        let v = RequiredValidator::with_message("Needed to publish.");
        assert_eq!(
            v.validate(&Value::Null).unwrap_err().message,
            "Needed to publish."
        );
    }

    #[test]
    fn test_max_length_counts_chars() {
        let v = MaxLengthValidator::new(3);
        assert!(v.validate(&Value::from("héé")).is_ok());
        let err = v.validate(&Value::from("abcd")).unwrap_err();
        assert_eq!(err.code, "max_length");
        assert_eq!(err.params.get("limit_value").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_min_length() {
        let v = MinLengthValidator::new(2);
        assert!(v.validate(&Value::from("ab")).is_ok());
        assert!(v.validate(&Value::from("a")).is_err());
        // Non-strings are ignored.
        assert!(v.validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_value_ranges() {
        assert!(MaxValueValidator::new(10.0).validate(&Value::Int(11)).is_err());
        assert!(MaxValueValidator::new(10.0).validate(&Value::Float(10.0)).is_ok());
        assert!(MinValueValidator::new(0.0).validate(&Value::Int(-1)).is_err());
        assert!(MinValueValidator::new(0.0).validate(&Value::from("x")).is_ok());
    }

    #[test]
    fn test_regex_validator() {
        let v = RegexValidator::new(r"^\d+$", "Digits only.").unwrap();
        assert!(v.validate(&Value::from("123")).is_ok());
        assert_eq!(
            v.validate(&Value::from("12a")).unwrap_err().message,
            "Digits only."
        );
        assert!(RegexValidator::new("(", "bad").is_err());
    }

    #[test]
    fn test_email_validator() {
        let v = EmailValidator;
        assert!(v.validate(&Value::from("a@example.com")).is_ok());
        assert!(v.validate(&Value::from("")).is_ok());
        assert!(v.validate(&Value::from("nope")).is_err());
    }

    #[test]
    fn test_fn_validator() {
        let v = from_fn("even", |value| match value {
            Value::Int(i) if i % 2 == 0 => Ok(()),
            _ => Err(ValidationError::invalid("Must be even.")),
        });
        assert_eq!(v.name(), "even");
        assert!(v.validate(&Value::Int(4)).is_ok());
        assert!(v.validate(&Value::Int(3)).is_err());
        assert!(format!("{v:?}").contains("even"));
    }
}
