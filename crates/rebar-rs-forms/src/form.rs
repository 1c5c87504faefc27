//! The [`Form`] trait and [`BaseForm`].
//!
//! [`BaseForm`] owns everything a single form needs: field definitions,
//! initial data, the bound raw input, and the memoised result of cleaning.
//! Richer form types ([`ModelForm`](crate::model_form::ModelForm),
//! [`StateValidatedForm`](crate::state_form::StateValidatedForm), user types)
//! wrap a `BaseForm` and implement [`Form`] by pointing
//! [`base`](Form::base)/[`base_mut`](Form::base_mut) at it; every other
//! method has a default that forwards there.
//!
//! Cleaning runs at most once per binding: [`Form::errors`] and
//! [`Form::is_valid`] trigger it lazily, and [`BaseForm::bind`] resets it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rebar_rs_core::{RebarResult, ValidationError, SETTINGS};

use crate::data::{FileData, FormData};
use crate::error_list::{add_errors, ErrorDict, NON_FIELD_ERRORS};
use crate::fields::{FormFieldDef, RawValue};
use crate::model::Model;
use crate::state::StateValidatorSet;
use crate::validation;
use crate::value::Value;

/// Cross-field validation hook run after every field cleaned.
///
/// Receives the cleaned data; an error is stored under
/// [`NON_FIELD_ERRORS`].
pub type CleanHook =
    Arc<dyn Fn(&HashMap<String, Value>) -> Result<(), ValidationError> + Send + Sync>;

/// Construction-time options shared by forms, formsets, and group members.
#[derive(Debug, Clone, Default)]
pub struct FormOptions<'a> {
    /// Submitted data; the form is bound if this or `files` is set.
    pub data: Option<&'a FormData>,
    /// Uploaded files.
    pub files: Option<&'a FileData>,
    /// Prefix applied to every field name.
    pub prefix: Option<String>,
    /// Initial values keyed by unprefixed field name.
    pub initial: Option<&'a HashMap<String, Value>>,
    /// HTML id template; `%s` is replaced by the prefixed field name.
    pub auto_id: Option<String>,
    /// Appended to field labels.
    pub label_suffix: Option<String>,
    /// Skip validation when the bound data does not differ from initial.
    pub empty_permitted: bool,
}

/// Deferred-commit save capability.
///
/// Forms that write onto a backing [`Model`] implement this and expose it
/// through [`Form::as_saveable`]. `save(instance, false)` mutates the
/// instance in memory only; post-commit hooks then run once the instance
/// has been persisted and has a primary key.
pub trait Saveable {
    /// Copies cleaned data onto `instance`, persisting it when `commit` is set.
    fn save(&mut self, instance: &mut dyn Model, commit: bool) -> RebarResult<()>;

    /// Returns `true` if relation values are waiting for [`save_m2m`](Saveable::save_m2m).
    fn has_save_m2m(&self) -> bool {
        false
    }

    /// Saves deferred relation values; needs a saved `instance`.
    fn save_m2m(&mut self, _instance: &mut dyn Model) -> RebarResult<()> {
        Ok(())
    }

    /// Returns `true` if this form has a related-object hook.
    fn has_save_related(&self) -> bool {
        false
    }

    /// Runs the related-object hook; needs a saved `instance`.
    fn save_related(&mut self, _instance: &mut dyn Model) -> RebarResult<()> {
        Ok(())
    }
}

/// The form-like capability.
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::data::FormData;
/// use rebar_rs_forms::fields::{FormFieldDef, FormFieldType};
/// use rebar_rs_forms::form::{BaseForm, Form};
///
/// let data = FormData::parse("contact-email=a%40example.com");
/// let mut form = BaseForm::new(vec![FormFieldDef::new("email", FormFieldType::Email)])
///     .with_prefix("contact")
///     .with_data(Some(&data), None);
///
/// assert!(form.is_valid());
/// assert_eq!(form.add_prefix("email"), "contact-email");
/// assert_eq!(form.html_id("email"), "id_contact-email");
/// ```
pub trait Form: Any + Send + Sync {
    /// The `BaseForm` holding this form's state.
    fn base(&self) -> &BaseForm;

    /// Mutable access to the `BaseForm` holding this form's state.
    fn base_mut(&mut self) -> &mut BaseForm;

    /// Upcast for typed access through `dyn Form`.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed access through `dyn Form`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Returns the form's field definitions.
    fn fields(&self) -> &[FormFieldDef] {
        self.base().fields()
    }

    /// Returns the initial values passed at construction.
    fn initial(&self) -> &HashMap<String, Value> {
        self.base().initial()
    }

    /// Returns the form prefix.
    fn prefix(&self) -> Option<&str> {
        self.base().prefix()
    }

    /// Returns the HTML id template.
    fn auto_id(&self) -> &str {
        self.base().auto_id()
    }

    /// Returns the suffix appended to field labels.
    fn label_suffix(&self) -> &str {
        self.base().label_suffix()
    }

    /// Returns `true` if the form was given data or files.
    fn is_bound(&self) -> bool {
        self.base().is_bound()
    }

    /// Returns the per-field errors, cleaning first if needed.
    fn errors(&mut self) -> &ErrorDict {
        self.base_mut().errors()
    }

    /// Returns `true` if the form is bound and has no errors.
    fn is_valid(&mut self) -> bool {
        self.base_mut().is_valid()
    }

    /// Returns the cleaned data. Empty until cleaning has run.
    fn cleaned_data(&self) -> &HashMap<String, Value> {
        self.base().cleaned_data()
    }

    /// Returns `field` with the form prefix applied.
    fn add_prefix(&self, field: &str) -> String {
        self.base().add_prefix(field)
    }

    /// Returns the name of the hidden input carrying `field`'s initial value.
    fn add_initial_prefix(&self, field: &str) -> String {
        format!("initial-{}", self.add_prefix(field))
    }

    /// Returns the HTML id for `field`.
    fn html_id(&self, field: &str) -> String {
        self.auto_id().replace("%s", &self.add_prefix(field))
    }

    /// Returns the initial value of `field`: construction initial, else the
    /// field's own initial, else `Null`.
    fn initial_value(&self, field: &str) -> Value {
        self.base().initial_value(field)
    }

    /// Returns the current value of `field`: the submitted value when bound,
    /// the initial value otherwise.
    fn value(&self, field: &str) -> Value {
        self.base().value(field)
    }

    /// Returns `true` if any submitted value differs from its initial value.
    fn has_changed(&self) -> bool {
        self.base().has_changed()
    }

    /// Deferred-commit save capability, if this form writes to a record.
    fn as_saveable(&mut self) -> Option<&mut dyn Saveable> {
        None
    }

    /// State validators, if this form is conditionally validatable.
    fn state_validators(&self) -> Option<&StateValidatorSet> {
        None
    }

    /// Mutable state validators, for toggling them.
    fn state_validators_mut(&mut self) -> Option<&mut StateValidatorSet> {
        None
    }
}

impl fmt::Debug for dyn Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("prefix", &self.prefix())
            .field("bound", &self.is_bound())
            .field("fields", &self.fields().len())
            .finish()
    }
}

/// A general-purpose form built from a list of field definitions.
pub struct BaseForm {
    field_defs: Vec<FormFieldDef>,
    initial_data: HashMap<String, Value>,
    prefix: Option<String>,
    auto_id: String,
    label_suffix: String,
    empty_permitted: bool,
    bound: bool,
    raw_data: HashMap<String, RawValue>,
    errors: Option<ErrorDict>,
    cleaned_data: HashMap<String, Value>,
    clean_hook: Option<CleanHook>,
}

impl BaseForm {
    /// Creates a new, unbound `BaseForm` with the given field definitions.
    pub fn new(fields: Vec<FormFieldDef>) -> Self {
        let settings = SETTINGS.current();
        Self {
            field_defs: fields,
            initial_data: HashMap::new(),
            prefix: None,
            auto_id: settings.map_or_else(|| "id_%s".to_string(), |s| s.auto_id.clone()),
            label_suffix: settings.map_or_else(|| ":".to_string(), |s| s.label_suffix.clone()),
            empty_permitted: false,
            bound: false,
            raw_data: HashMap::new(),
            errors: None,
            cleaned_data: HashMap::new(),
            clean_hook: None,
        }
    }

    /// Sets initial (default) values for fields.
    #[must_use]
    pub fn with_initial(mut self, initial: HashMap<String, Value>) -> Self {
        self.initial_data = initial;
        self
    }

    /// Sets the initial value of one field unless one is already present.
    pub fn insert_initial(&mut self, field: impl Into<String>, value: Value) {
        self.initial_data.entry(field.into()).or_insert(value);
    }

    /// Sets the form prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the HTML id template.
    #[must_use]
    pub fn with_auto_id(mut self, auto_id: impl Into<String>) -> Self {
        self.auto_id = auto_id.into();
        self
    }

    /// Sets the label suffix.
    #[must_use]
    pub fn with_label_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.label_suffix = suffix.into();
        self
    }

    /// Sets the cross-field clean hook.
    #[must_use]
    pub fn with_clean<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HashMap<String, Value>) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.clean_hook = Some(Arc::new(hook));
        self
    }

    /// Binds the form if either `data` or `files` is given.
    #[must_use]
    pub fn with_data(mut self, data: Option<&FormData>, files: Option<&FileData>) -> Self {
        if data.is_some() || files.is_some() {
            let empty_data = FormData::new();
            let empty_files = FileData::new();
            self.bind(data.unwrap_or(&empty_data), files.unwrap_or(&empty_files));
        }
        self
    }

    /// Applies every option in `options`, binding last so the prefix is in
    /// place when data is read.
    #[must_use]
    pub fn with_options(mut self, options: &FormOptions<'_>) -> Self {
        if let Some(prefix) = &options.prefix {
            self.prefix = Some(prefix.clone());
        }
        if let Some(initial) = options.initial {
            self.initial_data.extend(initial.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(auto_id) = &options.auto_id {
            self.auto_id = auto_id.clone();
        }
        if let Some(suffix) = &options.label_suffix {
            self.label_suffix = suffix.clone();
        }
        self.empty_permitted = options.empty_permitted;
        self.with_data(options.data, options.files)
    }

    /// Binds submitted data and files, discarding any previous cleaning.
    pub fn bind(&mut self, data: &FormData, files: &FileData) {
        self.bound = true;
        self.raw_data.clear();
        self.errors = None;
        self.cleaned_data.clear();

        for field in &self.field_defs {
            let html_name = self.add_prefix(&field.name);
            let raw = if field.is_file() {
                files
                    .get(&html_name)
                    .map_or(RawValue::Missing, |f| RawValue::File(f.clone()))
            } else if field.is_multi_valued() {
                data.get_list(&html_name)
                    .map_or(RawValue::Missing, |v| RawValue::Multiple(v.to_vec()))
            } else {
                data.get(&html_name)
                    .map_or(RawValue::Missing, |v| RawValue::Single(v.to_string()))
            };
            self.raw_data.insert(field.name.clone(), raw);
        }
    }

    /// Returns the form's field definitions.
    pub fn fields(&self) -> &[FormFieldDef] {
        &self.field_defs
    }

    /// Returns the definition of `name`.
    pub fn field(&self, name: &str) -> Option<&FormFieldDef> {
        self.field_defs.iter().find(|f| f.name == name)
    }

    /// Returns the initial values passed at construction.
    pub fn initial(&self) -> &HashMap<String, Value> {
        &self.initial_data
    }

    /// Returns the form prefix.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Returns the HTML id template.
    pub fn auto_id(&self) -> &str {
        &self.auto_id
    }

    /// Returns the suffix appended to field labels.
    pub fn label_suffix(&self) -> &str {
        &self.label_suffix
    }

    /// Returns the label of `field` followed by the label suffix.
    ///
    /// Labels already ending in punctuation are returned unchanged.
    pub fn label_text(&self, field: &str) -> Option<String> {
        let def = self.field_defs.iter().find(|f| f.name == field)?;
        if def.label.ends_with(&[':', '?', '.', '!'][..]) {
            Some(def.label.clone())
        } else {
            Some(format!("{}{}", def.label, self.label_suffix))
        }
    }

    /// Returns `true` if the form was given data or files.
    pub const fn is_bound(&self) -> bool {
        self.bound
    }

    /// Returns `true` if unchanged bound data skips validation.
    pub const fn empty_permitted(&self) -> bool {
        self.empty_permitted
    }

    /// Returns the raw input captured for `field`, if bound.
    pub fn raw_value(&self, field: &str) -> Option<&RawValue> {
        self.raw_data.get(field)
    }

    /// Returns `field` with the form prefix applied.
    pub fn add_prefix(&self, field: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{p}-{field}"),
            None => field.to_string(),
        }
    }

    /// Returns the initial value for `field`.
    pub fn initial_value(&self, field: &str) -> Value {
        self.initial_data
            .get(field)
            .cloned()
            .or_else(|| self.field(field).and_then(|f| f.initial.clone()))
            .unwrap_or(Value::Null)
    }

    /// Returns the current value for `field`.
    pub fn value(&self, field: &str) -> Value {
        let disabled = self.field(field).is_some_and(|f| f.disabled);
        match self.raw_data.get(field) {
            Some(raw) if self.bound && !disabled => raw.to_value(),
            _ => self.initial_value(field),
        }
    }

    /// Returns `true` if any submitted value differs from its initial value.
    pub fn has_changed(&self) -> bool {
        if !self.bound {
            return false;
        }
        self.field_defs.iter().filter(|f| !f.disabled).any(|field| {
            let raw = self.raw_data.get(&field.name).unwrap_or(&RawValue::Missing);
            validation::field_has_changed(field, &self.initial_value(&field.name), raw)
        })
    }

    /// Runs field cleaning and the clean hook, replacing any earlier result.
    pub fn full_clean(&mut self) {
        let mut errors = ErrorDict::new();
        self.cleaned_data.clear();

        if !self.bound {
            self.errors = Some(errors);
            return;
        }

        if self.empty_permitted && !self.has_changed() {
            tracing::trace!(prefix = ?self.prefix, "unchanged form skipped validation");
            self.errors = Some(errors);
            return;
        }

        let initial: HashMap<String, Value> = self
            .field_defs
            .iter()
            .map(|f| (f.name.clone(), self.initial_value(&f.name)))
            .collect();

        validation::clean_fields(
            &self.field_defs,
            &self.raw_data,
            &initial,
            &mut self.cleaned_data,
            &mut errors,
        );

        if let Some(hook) = &self.clean_hook {
            if let Err(e) = hook(&self.cleaned_data) {
                add_errors(&mut errors, NON_FIELD_ERRORS, e.messages());
            }
        }

        tracing::trace!(prefix = ?self.prefix, errors = errors.len(), "form cleaned");
        self.errors = Some(errors);
    }

    /// Returns the per-field errors, cleaning first if needed.
    pub fn errors(&mut self) -> &ErrorDict {
        if self.errors.is_none() {
            self.full_clean();
        }
        self.errors.get_or_insert_with(ErrorDict::new)
    }

    /// Returns `true` if the form is bound and has no errors.
    pub fn is_valid(&mut self) -> bool {
        self.bound && self.errors().is_empty()
    }

    /// Returns the cleaned data.
    pub fn cleaned_data(&self) -> &HashMap<String, Value> {
        &self.cleaned_data
    }

    /// Returns form-wide errors raised by the clean hook.
    pub fn non_field_errors(&mut self) -> Vec<String> {
        self.errors()
            .get(NON_FIELD_ERRORS)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for BaseForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseForm")
            .field("prefix", &self.prefix)
            .field("bound", &self.bound)
            .field("fields", &self.field_defs.iter().map(|d| &d.name).collect::<Vec<_>>())
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl Form for BaseForm {
    fn base(&self) -> &BaseForm {
        self
    }

    fn base_mut(&mut self) -> &mut BaseForm {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::data::UploadedFile;
    use crate::fields::FormFieldType;

    fn make_test_form() -> BaseForm {
        BaseForm::new(vec![
            FormFieldDef::new(
                "username",
                FormFieldType::Char {
                    min_length: Some(3),
                    max_length: Some(20),
                    strip: true,
                },
            ),
            FormFieldDef::new("email", FormFieldType::Email),
            FormFieldDef::new(
                "age",
                FormFieldType::Integer {
                    min_value: Some(0),
                    max_value: Some(150),
                },
            )
            .required(false),
        ])
    }

    #[test]
    fn test_form_unbound() {
        let mut form = make_test_form();
        assert!(!form.is_bound());
        assert!(!form.is_valid());
        assert!(form.errors().is_empty());
    }

    #[test]
    fn test_form_bind_and_validate() {
        let data = FormData::parse("username=alice&email=alice@example.com&age=30");
        let mut form = make_test_form().with_data(Some(&data), None);
        assert!(form.is_bound());
        assert!(form.is_valid());
        assert_eq!(form.cleaned_data().get("username"), Some(&Value::from("alice")));
        assert_eq!(form.cleaned_data().get("age"), Some(&Value::Int(30)));
    }

    #[test]
    fn test_form_validation_errors() {
        let data = FormData::parse("username=ab&email=not-email");
        let mut form = make_test_form().with_data(Some(&data), None);
        assert!(!form.is_valid());
        assert!(form.errors().contains_key("username"));
        assert!(form.errors().contains_key("email"));
        assert!(!form.errors().contains_key("age"));
    }

    #[test]
    fn test_form_with_prefix_reads_prefixed_keys() {
        let data = FormData::parse("myform-username=alice&myform-email=alice@example.com");
        let mut form = make_test_form()
            .with_prefix("myform")
            .with_data(Some(&data), None);
        assert_eq!(form.prefix(), Some("myform"));
        assert!(form.is_valid());
        assert_eq!(form.add_initial_prefix("age"), "initial-myform-age");
    }

    #[test]
    fn test_files_alone_bind_the_form() {
        let mut files = FileData::new();
        files.insert("doc".into(), UploadedFile::new("a.pdf", "application/pdf", 10));
        let mut form = BaseForm::new(vec![FormFieldDef::new(
            "doc",
            FormFieldType::File { max_size: None },
        )])
        .with_data(None, Some(&files));
        assert!(form.is_bound());
        assert!(form.is_valid());
        assert_eq!(form.cleaned_data().get("doc"), Some(&Value::from("a.pdf")));
    }

    #[test]
    fn test_value_prefers_bound_data_then_initial() {
        let mut initial = HashMap::new();
        initial.insert("username".to_string(), Value::from("default_user"));
        let unbound = make_test_form().with_initial(initial.clone());
        assert_eq!(unbound.value("username"), Value::from("default_user"));
        assert_eq!(unbound.value("email"), Value::Null);

        let data = FormData::parse("username=bob");
        let bound = make_test_form()
            .with_initial(initial)
            .with_data(Some(&data), None);
        assert_eq!(bound.value("username"), Value::from("bob"));
    }

    #[test]
    fn test_cleaning_is_memoised_until_rebind() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let data = FormData::parse("username=alice&email=a@example.com");
        let mut form = make_test_form()
            .with_clean(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_data(Some(&data), None);

        assert!(form.is_valid());
        assert!(form.is_valid());
        let _ = form.errors();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        form.bind(&data, &FileData::new());
        assert!(form.is_valid());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clean_hook_errors_are_non_field() {
        let data = FormData::parse("username=alice&email=a@example.com");
        let mut form = make_test_form()
            .with_clean(|cleaned| {
                if cleaned.get("username") == Some(&Value::from("alice")) {
                    return Err(ValidationError::invalid("alice is reserved."));
                }
                Ok(())
            })
            .with_data(Some(&data), None);
        assert!(!form.is_valid());
        assert_eq!(form.non_field_errors(), vec!["alice is reserved.".to_string()]);
    }

    #[test]
    fn test_has_changed() {
        let mut initial = HashMap::new();
        initial.insert("username".to_string(), Value::from("alice"));

        let same = FormData::parse("username=alice");
        let form = make_test_form()
            .with_initial(initial.clone())
            .with_data(Some(&same), None);
        assert!(!form.has_changed());

        let different = FormData::parse("username=bob");
        let form = make_test_form()
            .with_initial(initial)
            .with_data(Some(&different), None);
        assert!(form.has_changed());
    }

    #[test]
    fn test_label_text() {
        let form = make_test_form();
        assert_eq!(form.label_suffix(), ":");
        assert_eq!(form.label_text("username").as_deref(), Some("username:"));
        assert_eq!(form.label_text("missing"), None);

        let form = BaseForm::new(vec![
            FormFieldDef::new("agree", FormFieldType::Boolean).label("Agree?")
        ])
        .with_options(&FormOptions {
            label_suffix: Some(" =".into()),
            ..FormOptions::default()
        });
        assert_eq!(form.label_suffix(), " =");
        assert_eq!(form.label_text("agree").as_deref(), Some("Agree?"));
    }

    #[test]
    fn test_empty_permitted_skips_unchanged() {
        let options = FormOptions {
            data: Some(&FormData::new()),
            empty_permitted: true,
            ..FormOptions::default()
        };
        let mut form = make_test_form().with_options(&options);
        assert!(form.is_bound());
        assert!(form.is_valid());
        assert!(form.cleaned_data().is_empty());
    }

    #[test]
    fn test_html_id_uses_template() {
        let form = make_test_form().with_prefix("p").with_auto_id("field_%s");
        assert_eq!(form.html_id("email"), "field_p-email");
    }

    #[test]
    fn test_downcast_through_dyn_form() {
        let form: Box<dyn Form> = Box::new(make_test_form());
        assert!(form.as_any().downcast_ref::<BaseForm>().is_some());
        assert!(format!("{form:?}").contains("Form"));
    }
}
