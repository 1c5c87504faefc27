//! Flattening form-like objects into submitted data.
//!
//! [`flatten_to_dict`] produces the [`FormData`] a browser would post for a
//! form, formset or group as currently rendered: every field's current value
//! under its prefixed name, formset management data, and hidden-initial
//! copies where a field asks for them. Tests then tweak a few keys and bind
//! a fresh object to the result.

use rebar_rs_forms::data::FormData;
use rebar_rs_forms::form::{BaseForm, Form};
use rebar_rs_forms::formset::{FormSet, PREFIX_PLACEHOLDER};
use rebar_rs_forms::model_form::ModelForm;
use rebar_rs_forms::state_form::StateValidatedForm;
use rebar_rs_forms::value::Value;
use rebar_rs_forms::ErrorContainer;
use rebar_rs_groups::{FormGroup, Member};

/// Something that can be flattened into submitted data.
pub trait Flatten {
    /// Writes this object's fields into `data`.
    fn flatten_into(&self, data: &mut FormData);
}

/// Flattens `item` into the data a browser would submit for it.
///
/// Missing values become the empty string. Lists are written as one entry
/// per item under the same key.
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::fields::{FormFieldDef, FormFieldType};
/// use rebar_rs_forms::form::BaseForm;
/// use rebar_rs_test::flatten_to_dict;
///
/// let form = BaseForm::new(vec![
///     FormFieldDef::new("name", FormFieldType::char()).initial("Ada"),
///     FormFieldDef::new("age", FormFieldType::integer()),
/// ])
/// .with_prefix("person");
///
/// let data = flatten_to_dict(&form);
/// assert_eq!(data.get("person-name"), Some("Ada"));
/// assert_eq!(data.get("person-age"), Some(""));
/// ```
pub fn flatten_to_dict<T: Flatten + ?Sized>(item: &T) -> FormData {
    let mut data = FormData::new();
    item.flatten_into(&mut data);
    data
}

/// Returns the data for a new blank form of `formset` at `index`.
///
/// Only `None` places the form right after the current ones, at
/// [`FormSet::total_form_count`]. `Some(0)` is a real index and targets
/// the first form.
pub fn empty_form_data(formset: &FormSet, index: Option<usize>) -> FormData {
    let index = index.unwrap_or_else(|| formset.total_form_count()).to_string();
    let form = formset.empty_form();
    let mut data = FormData::new();
    for field in form.fields() {
        let value = form.value(&field.name);
        let key = form.add_prefix(&field.name).replace(PREFIX_PLACEHOLDER, &index);
        write_value(&mut data, &key, &value);
        if field.show_hidden_initial {
            let key = form
                .add_initial_prefix(&field.name)
                .replace(PREFIX_PLACEHOLDER, &index);
            write_value(&mut data, &key, &value);
        }
    }
    data
}

fn flatten_form(form: &dyn Form, data: &mut FormData) {
    for field in form.fields() {
        let value = form.value(&field.name);
        write_value(data, &form.add_prefix(&field.name), &value);
        if field.show_hidden_initial {
            write_value(data, &form.add_initial_prefix(&field.name), &value);
        }
    }
}

fn write_value(data: &mut FormData, key: &str, value: &Value) {
    data.remove(key);
    match value {
        Value::List(items) if !items.is_empty() => {
            for item in items {
                data.append(key, item.to_form_string());
            }
        }
        Value::List(_) => data.set(key, ""),
        other => data.set(key, other.to_form_string()),
    }
}

impl Flatten for dyn Form {
    fn flatten_into(&self, data: &mut FormData) {
        flatten_form(self, data);
    }
}

impl Flatten for BaseForm {
    fn flatten_into(&self, data: &mut FormData) {
        flatten_form(self, data);
    }
}

impl Flatten for ModelForm {
    fn flatten_into(&self, data: &mut FormData) {
        flatten_form(self, data);
    }
}

impl<F: Form> Flatten for StateValidatedForm<F> {
    fn flatten_into(&self, data: &mut FormData) {
        flatten_form(self, data);
    }
}

impl Flatten for FormSet {
    fn flatten_into(&self, data: &mut FormData) {
        for form in self.forms() {
            flatten_form(&**form, data);
        }
        data.extend(self.management_form_data());
    }
}

impl Flatten for Member {
    fn flatten_into(&self, data: &mut FormData) {
        match self {
            Self::Form(form) => flatten_form(&**form, data),
            Self::FormSet(formset) => formset.flatten_into(data),
        }
    }
}

impl<E: ErrorContainer> Flatten for FormGroup<E> {
    fn flatten_into(&self, data: &mut FormData) {
        for member in self.forms() {
            member.flatten_into(data);
        }
    }
}
