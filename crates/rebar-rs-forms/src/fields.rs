//! Form field definitions and type-level cleaning.
//!
//! Each [`FormFieldDef`] describes a single form field: its type, whether it
//! is required, its initial value, and any extra validators. [`clean_field_value`]
//! turns the raw submitted input for a field into a typed [`Value`],
//! accumulating every error it finds.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::data::UploadedFile;
use crate::validators::{SharedValidator, Validator, EMAIL_RE, REQUIRED_MESSAGE};
use crate::value::Value;

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("valid regex"));

/// Defines the type of a form field, including type-specific parameters.
#[derive(Debug, Clone)]
pub enum FormFieldType {
    /// A character (string) field.
    Char {
        /// Minimum length (characters).
        min_length: Option<usize>,
        /// Maximum length (characters).
        max_length: Option<usize>,
        /// Whether to strip leading/trailing whitespace.
        strip: bool,
    },
    /// An integer field.
    Integer {
        /// Minimum allowed value.
        min_value: Option<i64>,
        /// Maximum allowed value.
        max_value: Option<i64>,
    },
    /// A floating-point field.
    Float {
        /// Minimum allowed value.
        min_value: Option<f64>,
        /// Maximum allowed value.
        max_value: Option<f64>,
    },
    /// A boolean field (true/false).
    Boolean,
    /// A date field (YYYY-MM-DD).
    Date,
    /// A date-time field (YYYY-MM-DDTHH:MM:SS).
    DateTime,
    /// An email address field.
    Email,
    /// A slug field (letters, numbers, hyphens, underscores).
    Slug,
    /// A UUID field.
    Uuid,
    /// A single-choice field.
    Choice {
        /// Available choices as `(value, display_label)` pairs.
        choices: Vec<(String, String)>,
    },
    /// A multiple-choice field; reads every submitted value for its key.
    MultipleChoice {
        /// Available choices as `(value, display_label)` pairs.
        choices: Vec<(String, String)>,
    },
    /// A file upload field; reads from the form's files.
    File {
        /// Maximum file size in bytes.
        max_size: Option<usize>,
    },
    /// A field validated against a regular expression.
    Regex {
        /// The regex pattern string.
        regex: String,
    },
}

impl FormFieldType {
    /// A `Char` field with no length limits that strips whitespace.
    pub const fn char() -> Self {
        Self::Char {
            min_length: None,
            max_length: None,
            strip: true,
        }
    }

    /// An `Integer` field with no range limits.
    pub const fn integer() -> Self {
        Self::Integer {
            min_value: None,
            max_value: None,
        }
    }
}

/// Raw input captured for one field when a form is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Nothing was submitted for the field.
    Missing,
    /// A single submitted string.
    Single(String),
    /// Every submitted string for a multi-valued field.
    Multiple(Vec<String>),
    /// An uploaded file.
    File(UploadedFile),
}

impl RawValue {
    /// Returns `true` if nothing meaningful was submitted.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Single(s) => s.is_empty(),
            Self::Multiple(items) => items.iter().all(String::is_empty),
            Self::File(_) => false,
        }
    }

    /// Converts the raw input to an uncleaned [`Value`].
    pub fn to_value(&self) -> Value {
        match self {
            Self::Missing => Value::Null,
            Self::Single(s) => Value::String(s.clone()),
            Self::Multiple(items) => {
                Value::List(items.iter().cloned().map(Value::String).collect())
            }
            Self::File(file) => Value::String(file.name.clone()),
        }
    }
}

/// Complete definition of a form field.
#[derive(Debug, Clone)]
pub struct FormFieldDef {
    /// The field name (unprefixed).
    pub name: String,
    /// The field type, controlling parsing and coercion.
    pub field_type: FormFieldType,
    /// Whether this field is required.
    pub required: bool,
    /// Default/initial value.
    pub initial: Option<Value>,
    /// Help text displayed alongside the field.
    pub help_text: String,
    /// Human-readable label.
    pub label: String,
    /// Additional validators applied after type coercion.
    pub validators: Vec<SharedValidator>,
    /// Custom error messages keyed by error code.
    pub error_messages: HashMap<String, String>,
    /// Whether the field is disabled (rendered but not editable).
    pub disabled: bool,
    /// Whether the initial value is also submitted in a hidden input.
    pub show_hidden_initial: bool,
}

impl FormFieldDef {
    /// Creates a new `FormFieldDef` with sensible defaults.
    ///
    /// The field is required by default and has no validators beyond the
    /// type-level validation.
    pub fn new(name: impl Into<String>, field_type: FormFieldType) -> Self {
        let name = name.into();
        let label = name.replace('_', " ");
        Self {
            name,
            field_type,
            required: true,
            initial: None,
            help_text: String::new(),
            label,
            validators: Vec::new(),
            error_messages: HashMap::new(),
            disabled: false,
            show_hidden_initial: false,
        }
    }

    /// Sets whether this field is required.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the initial value.
    #[must_use]
    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Adds a validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Adds an already shared validator.
    #[must_use]
    pub fn shared_validator(mut self, validator: SharedValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Sets a custom error message for a given code.
    #[must_use]
    pub fn error_message(mut self, code: impl Into<String>, msg: impl Into<String>) -> Self {
        self.error_messages.insert(code.into(), msg.into());
        self
    }

    /// Sets whether this field is disabled.
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Sets whether the initial value is rendered as a hidden input.
    #[must_use]
    pub fn show_hidden_initial(mut self, show: bool) -> Self {
        self.show_hidden_initial = show;
        self
    }

    /// Returns `true` if this field reads every submitted value for its key.
    pub const fn is_multi_valued(&self) -> bool {
        matches!(self.field_type, FormFieldType::MultipleChoice { .. })
    }

    /// Returns `true` if this field reads from uploaded files.
    pub const fn is_file(&self) -> bool {
        matches!(self.field_type, FormFieldType::File { .. })
    }
}

/// Cleans (validates and coerces) raw input into a typed `Value`.
///
/// 1. Required check (if `required` and the input is empty)
/// 2. Type coercion (string -> i64, date, etc.)
/// 3. Type-specific constraint validation (min/max, regex, choices)
/// 4. Custom validators
///
/// Returns the cleaned `Value` or every error message found.
pub fn clean_field_value(field: &FormFieldDef, raw: &RawValue) -> Result<Value, Vec<String>> {
    if raw.is_empty() {
        if field.required {
            let msg = field
                .error_messages
                .get("required")
                .cloned()
                .unwrap_or_else(|| REQUIRED_MESSAGE.to_string());
            return Err(vec![msg]);
        }
        return Ok(empty_value_for(field));
    }

    let mut errors = Vec::new();
    let value = coerce(field, raw, &mut errors);

    if errors.is_empty() {
        for validator in &field.validators {
            if let Err(e) = validator.validate(&value) {
                let messages = e.messages();
                let custom = field.error_messages.get(&e.code);
                match custom {
                    Some(msg) => errors.push(msg.clone()),
                    None => errors.extend(messages),
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

fn empty_value_for(field: &FormFieldDef) -> Value {
    match field.field_type {
        FormFieldType::Char { .. }
        | FormFieldType::Email
        | FormFieldType::Slug
        | FormFieldType::Regex { .. }
        | FormFieldType::Choice { .. } => Value::String(String::new()),
        FormFieldType::Boolean => Value::Bool(false),
        FormFieldType::MultipleChoice { .. } => Value::List(Vec::new()),
        _ => Value::Null,
    }
}

#[allow(clippy::too_many_lines)]
fn coerce(field: &FormFieldDef, raw: &RawValue, errors: &mut Vec<String>) -> Value {
    let raw_str = match raw {
        RawValue::Single(s) => s.as_str(),
        RawValue::Multiple(items) => items.last().map_or("", String::as_str),
        RawValue::File(_) | RawValue::Missing => "",
    };

    match &field.field_type {
        FormFieldType::Char {
            min_length,
            max_length,
            strip,
        } => {
            let s = if *strip { raw_str.trim() } else { raw_str };
            let len = s.chars().count();
            if let Some(min) = min_length {
                if len < *min {
                    errors.push(format!(
                        "Ensure this value has at least {min} characters (it has {len})."
                    ));
                }
            }
            if let Some(max) = max_length {
                if len > *max {
                    errors.push(format!(
                        "Ensure this value has at most {max} characters (it has {len})."
                    ));
                }
            }
            Value::String(s.to_string())
        }

        FormFieldType::Integer {
            min_value,
            max_value,
        } => match raw_str.trim().parse::<i64>() {
            Ok(n) => {
                if let Some(min) = min_value {
                    if n < *min {
                        errors.push(format!(
                            "Ensure this value is greater than or equal to {min}."
                        ));
                    }
                }
                if let Some(max) = max_value {
                    if n > *max {
                        errors.push(format!("Ensure this value is less than or equal to {max}."));
                    }
                }
                Value::Int(n)
            }
            Err(_) => {
                errors.push("Enter a whole number.".to_string());
                Value::Null
            }
        },

        FormFieldType::Float {
            min_value,
            max_value,
        } => match raw_str.trim().parse::<f64>() {
            Ok(n) => {
                if let Some(min) = min_value {
                    if n < *min {
                        errors.push(format!(
                            "Ensure this value is greater than or equal to {min}."
                        ));
                    }
                }
                if let Some(max) = max_value {
                    if n > *max {
                        errors.push(format!("Ensure this value is less than or equal to {max}."));
                    }
                }
                Value::Float(n)
            }
            Err(_) => {
                errors.push("Enter a number.".to_string());
                Value::Null
            }
        },

        FormFieldType::Boolean => {
            let val = matches!(raw_str.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
            Value::Bool(val)
        }

        FormFieldType::Date => match chrono::NaiveDate::parse_from_str(raw_str, "%Y-%m-%d") {
            Ok(d) => Value::Date(d),
            Err(_) => {
                errors.push("Enter a valid date.".to_string());
                Value::Null
            }
        },

        FormFieldType::DateTime => {
            let result = chrono::NaiveDateTime::parse_from_str(raw_str, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw_str, "%Y-%m-%dT%H:%M"))
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw_str, "%Y-%m-%d %H:%M:%S"))
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw_str, "%Y-%m-%d %H:%M"));
            match result {
                Ok(dt) => Value::DateTime(dt),
                Err(_) => {
                    errors.push("Enter a valid date/time.".to_string());
                    Value::Null
                }
            }
        }

        FormFieldType::Email => {
            let s = raw_str.trim();
            if !EMAIL_RE.is_match(s) {
                errors.push("Enter a valid email address.".to_string());
            }
            Value::String(s.to_string())
        }

        FormFieldType::Slug => {
            if !SLUG_RE.is_match(raw_str) {
                errors.push(
                    "Enter a valid \"slug\" consisting of letters, numbers, underscores or hyphens."
                        .to_string(),
                );
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::Uuid => match uuid::Uuid::parse_str(raw_str.trim()) {
            Ok(u) => Value::Uuid(u),
            Err(_) => {
                errors.push("Enter a valid UUID.".to_string());
                Value::Null
            }
        },

        FormFieldType::Choice { choices } => {
            if !choices.iter().any(|(v, _)| v == raw_str) {
                errors.push(format!(
                    "Select a valid choice. {raw_str} is not one of the available choices."
                ));
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::MultipleChoice { choices } => {
            let selected: Vec<&str> = match raw {
                RawValue::Multiple(items) => items.iter().map(String::as_str).collect(),
                _ => raw_str.split(',').map(str::trim).collect(),
            };
            let mut valid_values = Vec::new();
            for s in selected.into_iter().filter(|s| !s.is_empty()) {
                if choices.iter().any(|(v, _)| v == s) {
                    valid_values.push(Value::String(s.to_string()));
                } else {
                    errors.push(format!(
                        "Select a valid choice. {s} is not one of the available choices."
                    ));
                }
            }
            Value::List(valid_values)
        }

        FormFieldType::File { max_size } => match raw {
            RawValue::File(file) => {
                if let Some(max) = max_size {
                    if file.size > *max {
                        errors.push(format!("File size exceeds maximum of {max} bytes."));
                    }
                }
                Value::String(file.name.clone())
            }
            _ => {
                errors.push(
                    "No file was submitted. Check the encoding type on the form.".to_string(),
                );
                Value::Null
            }
        },

        FormFieldType::Regex { regex } => match Regex::new(regex) {
            Ok(re) => {
                if !re.is_match(raw_str) {
                    errors.push("Enter a valid value.".to_string());
                }
                Value::String(raw_str.to_string())
            }
            Err(e) => {
                errors.push(format!("Invalid regex: {e}"));
                Value::Null
            }
        },
    }
}
