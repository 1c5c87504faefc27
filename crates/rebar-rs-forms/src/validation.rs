//! Field-level validation pipeline and change detection.
//!
//! Errors accumulate across fields rather than short-circuiting, so every
//! problem with a submission is reported at once.

use std::collections::HashMap;

use crate::error_list::{add_errors, ErrorDict};
use crate::fields::{clean_field_value, FormFieldDef, FormFieldType, RawValue};
use crate::value::Value;

/// Cleans every field, filling `cleaned_data` on success and `errors` on
/// failure.
///
/// Disabled fields skip validation and take their value from `initial`.
pub fn clean_fields(
    field_defs: &[FormFieldDef],
    raw_data: &HashMap<String, RawValue>,
    initial: &HashMap<String, Value>,
    cleaned_data: &mut HashMap<String, Value>,
    errors: &mut ErrorDict,
) {
    for field in field_defs {
        if field.disabled {
            let value = initial.get(&field.name).cloned().unwrap_or(Value::Null);
            cleaned_data.insert(field.name.clone(), value);
            continue;
        }

        let raw = raw_data.get(&field.name).unwrap_or(&RawValue::Missing);
        match clean_field_value(field, raw) {
            Ok(value) => {
                cleaned_data.insert(field.name.clone(), value);
            }
            Err(field_errors) => add_errors(errors, &field.name, field_errors),
        }
    }
}

/// Returns `true` if the submitted `raw` input differs from `initial`.
///
/// Comparison is on the rendered form strings, so `Int(3)` and `"3"` are
/// equal. Booleans compare by truthiness because an unchecked box submits
/// nothing.
pub fn field_has_changed(field: &FormFieldDef, initial: &Value, raw: &RawValue) -> bool {
    match (&field.field_type, raw) {
        (FormFieldType::Boolean, _) => {
            let submitted = raw.to_value().to_form_string();
            let submitted = matches!(submitted.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
            let original = matches!(initial, Value::Bool(true))
                || matches!(initial.to_form_string().to_lowercase().as_str(), "true" | "1");
            submitted != original
        }
        (_, RawValue::Multiple(items)) => {
            let original: Vec<String> = match initial {
                Value::List(values) => values.iter().map(Value::to_form_string).collect(),
                Value::Null => Vec::new(),
                other => vec![other.to_form_string()],
            };
            let mut submitted = items.clone();
            submitted.retain(|s| !s.is_empty());
            submitted != original
        }
        (_, RawValue::File(_)) => true,
        _ => {
            let submitted = raw.to_value().to_form_string();
            let strip = matches!(field.field_type, FormFieldType::Char { strip: true, .. });
            let submitted = if strip { submitted.trim().to_string() } else { submitted };
            submitted != initial.to_form_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s: &str) -> RawValue {
        RawValue::Single(s.to_string())
    }

    #[test]
    fn test_clean_fields_valid() {
        let fields = vec![
            FormFieldDef::new("name", FormFieldType::char()),
            FormFieldDef::new("age", FormFieldType::integer()),
        ];
        let mut raw_data = HashMap::new();
        raw_data.insert("name".to_string(), raw("Alice"));
        raw_data.insert("age".to_string(), raw("30"));

        let mut cleaned = HashMap::new();
        let mut errors = ErrorDict::new();
        clean_fields(&fields, &raw_data, &HashMap::new(), &mut cleaned, &mut errors);

        assert!(errors.is_empty());
        assert_eq!(cleaned.get("name"), Some(&Value::from("Alice")));
        assert_eq!(cleaned.get("age"), Some(&Value::Int(30)));
    }

    #[test]
    fn test_clean_fields_errors_accumulate() {
        let fields = vec![
            FormFieldDef::new("name", FormFieldType::char()),
            FormFieldDef::new("email", FormFieldType::Email),
        ];
        let mut cleaned = HashMap::new();
        let mut errors = ErrorDict::new();
        clean_fields(&fields, &HashMap::new(), &HashMap::new(), &mut cleaned, &mut errors);

        assert_eq!(errors.len(), 2);
        assert!(cleaned.is_empty());
    }

    #[test]
    fn test_disabled_fields_use_initial() {
        let fields = vec![FormFieldDef::new("status", FormFieldType::char()).disabled(true)];
        let mut raw_data = HashMap::new();
        raw_data.insert("status".to_string(), raw("hacked"));
        let mut initial = HashMap::new();
        initial.insert("status".to_string(), Value::from("active"));

        let mut cleaned = HashMap::new();
        let mut errors = ErrorDict::new();
        clean_fields(&fields, &raw_data, &initial, &mut cleaned, &mut errors);

        assert!(errors.is_empty());
        assert_eq!(cleaned.get("status"), Some(&Value::from("active")));
    }

    #[test]
    fn test_has_changed_compares_rendered_strings() {
        let field = FormFieldDef::new("age", FormFieldType::integer());
        assert!(!field_has_changed(&field, &Value::Int(3), &raw("3")));
        assert!(field_has_changed(&field, &Value::Int(3), &raw("4")));
        assert!(!field_has_changed(&field, &Value::Null, &RawValue::Missing));
    }

    #[test]
    fn test_has_changed_boolean() {
        let field = FormFieldDef::new("agree", FormFieldType::Boolean);
        assert!(!field_has_changed(&field, &Value::Bool(false), &RawValue::Missing));
        assert!(field_has_changed(&field, &Value::Bool(false), &raw("on")));
        assert!(!field_has_changed(&field, &Value::Bool(true), &raw("on")));
    }

    #[test]
    fn test_has_changed_strips_char() {
        let field = FormFieldDef::new("name", FormFieldType::char());
        assert!(!field_has_changed(&field, &Value::from("Jo"), &raw(" Jo ")));
    }
}
