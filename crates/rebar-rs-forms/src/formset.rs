//! Formsets: several copies of one form on a single page.
//!
//! A [`FormSet`] is built by a [`FormSetFactory`] from a form constructor.
//! When bound, the number of forms comes from the management data
//! (`<prefix>-TOTAL_FORMS`, `<prefix>-INITIAL_FORMS`); unbound, from the
//! initial rows plus `extra`. Extra forms the user left untouched skip
//! validation.
//!
//! With `can_delete`, a truthy `<form-prefix>-DELETE` value marks a form for
//! deletion: it is excluded from validity and from saving.
//!
//! Inline formsets ([`FormSetFactory::with_fk`]) save their rows as children
//! of a parent [`Model`], which therefore must already have a primary key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rebar_rs_core::{RebarError, RebarResult, ValidationError, SETTINGS};

use crate::data::{FileData, FormData};
use crate::error_list::{ErrorDict, ErrorList};
use crate::form::{Form, FormOptions};
use crate::model::Model;
use crate::value::Value;

/// Management field holding the number of forms submitted.
pub const TOTAL_FORMS: &str = "TOTAL_FORMS";
/// Management field holding the number of forms bound to existing rows.
pub const INITIAL_FORMS: &str = "INITIAL_FORMS";
/// Management field echoing `min_num`.
pub const MIN_NUM_FORMS: &str = "MIN_NUM_FORMS";
/// Management field echoing `max_num`.
pub const MAX_NUM_FORMS: &str = "MAX_NUM_FORMS";
/// Per-form field marking the form for deletion.
pub const DELETION_FIELD_NAME: &str = "DELETE";
/// Placeholder standing in for the form index in [`FormSet::empty_form`].
pub const PREFIX_PLACEHOLDER: &str = "__prefix__";

const DEFAULT_PREFIX: &str = "form";

/// Builds one form of a formset from its options.
pub type FormConstructor = Arc<dyn Fn(&FormOptions<'_>) -> Box<dyn Form> + Send + Sync>;

/// Where an inline formset stores its rows on the parent record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineConfig {
    /// Relation name on the parent.
    pub relation: String,
    /// Field on each child pointing back at the parent.
    pub fk_name: String,
}

/// Construction options for a formset.
#[derive(Debug, Clone, Default)]
pub struct FormSetOptions<'a> {
    /// Submitted data; the formset is bound if this or `files` is set.
    pub data: Option<&'a FormData>,
    /// Uploaded files.
    pub files: Option<&'a FileData>,
    /// Formset prefix; defaults to `"form"`.
    pub prefix: Option<String>,
    /// One initial row per existing form.
    pub initial: Option<&'a [HashMap<String, Value>]>,
    /// HTML id template passed to each form.
    pub auto_id: Option<String>,
    /// Label suffix passed to each form.
    pub label_suffix: Option<String>,
}

/// Declares a formset: the form to repeat and how many of it.
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::fields::{FormFieldDef, FormFieldType};
/// use rebar_rs_forms::form::{BaseForm, Form};
/// use rebar_rs_forms::formset::{FormSetFactory, FormSetOptions};
///
/// let factory = FormSetFactory::new(|options| {
///     Box::new(BaseForm::new(vec![FormFieldDef::new("name", FormFieldType::char())])
///         .with_options(options)) as Box<dyn Form>
/// })
/// .with_extra(2);
///
/// let formset = factory.build(&FormSetOptions::default());
/// assert_eq!(formset.total_form_count(), 2);
/// assert_eq!(formset.forms()[1].add_prefix("name"), "form-1-name");
/// ```
#[derive(Clone)]
pub struct FormSetFactory {
    constructor: FormConstructor,
    extra: usize,
    min_num: usize,
    max_num: usize,
    validate_min: bool,
    validate_max: bool,
    can_delete: bool,
    inline: Option<InlineConfig>,
}

impl FormSetFactory {
    /// Creates a factory repeating the form built by `constructor`.
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn(&FormOptions<'_>) -> Box<dyn Form> + Send + Sync + 'static,
    {
        let settings = SETTINGS.current_or_default();
        Self {
            constructor: Arc::new(constructor),
            extra: settings.formset_extra,
            min_num: 0,
            max_num: settings.formset_max_num,
            validate_min: false,
            validate_max: false,
            can_delete: false,
            inline: None,
        }
    }

    /// Sets the number of blank forms shown after the initial ones.
    #[must_use]
    pub const fn with_extra(mut self, extra: usize) -> Self {
        self.extra = extra;
        self
    }

    /// Sets the minimum number of forms, enforced when `validate` is set.
    #[must_use]
    pub const fn with_min_num(mut self, min_num: usize, validate: bool) -> Self {
        self.min_num = min_num;
        self.validate_min = validate;
        self
    }

    /// Sets the maximum number of forms, enforced when `validate` is set.
    #[must_use]
    pub const fn with_max_num(mut self, max_num: usize, validate: bool) -> Self {
        self.max_num = max_num;
        self.validate_max = validate;
        self
    }

    /// Enables deletion through the `DELETE` field.
    #[must_use]
    pub const fn with_can_delete(mut self, can_delete: bool) -> Self {
        self.can_delete = can_delete;
        self
    }

    /// Makes this an inline formset saving rows under `relation` of a parent
    /// record, linked back through `fk_name`.
    #[must_use]
    pub fn with_fk(mut self, relation: impl Into<String>, fk_name: impl Into<String>) -> Self {
        self.inline = Some(InlineConfig {
            relation: relation.into(),
            fk_name: fk_name.into(),
        });
        self
    }

    /// Builds a formset.
    pub fn build(&self, options: &FormSetOptions<'_>) -> FormSet {
        let prefix = options
            .prefix
            .clone()
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let auto_id = options
            .auto_id
            .clone()
            .unwrap_or_else(|| SETTINGS.current_or_default().auto_id);
        let bound = options.data.is_some() || options.files.is_some();
        let data = options.data.cloned().unwrap_or_default();
        let initial_rows = options.initial.unwrap_or(&[]);

        let mut management_ok = true;
        let (total, initial_count) = if bound {
            let total = parse_count(&data, &prefix, TOTAL_FORMS);
            let initial = parse_count(&data, &prefix, INITIAL_FORMS);
            match (total, initial) {
                (Some(total), Some(initial)) => {
                    let total = total.min(self.absolute_max());
                    (total, initial.min(total))
                }
                _ => {
                    management_ok = false;
                    (0, 0)
                }
            }
        } else {
            let initial = initial_rows.len();
            let wanted = initial.max(self.min_num) + self.extra;
            let total = if initial > self.max_num {
                initial
            } else {
                wanted.min(self.max_num)
            };
            (total, initial)
        };

        let forms = (0..total)
            .map(|i| {
                let form_options = FormOptions {
                    data: options.data,
                    files: options.files,
                    prefix: Some(format!("{prefix}-{i}")),
                    initial: if i < initial_count {
                        initial_rows.get(i)
                    } else {
                        None
                    },
                    auto_id: Some(auto_id.clone()),
                    label_suffix: options.label_suffix.clone(),
                    empty_permitted: i >= initial_count && i >= self.min_num,
                };
                (self.constructor)(&form_options)
            })
            .collect();

        tracing::trace!(%prefix, total, initial = initial_count, bound, "formset built");

        FormSet {
            forms,
            prefix,
            auto_id,
            label_suffix: options.label_suffix.clone(),
            bound,
            data,
            initial_form_count: initial_count,
            management_ok,
            factory: self.clone(),
            errors: None,
            non_form_errors: ErrorList::new(),
        }
    }

    const fn absolute_max(&self) -> usize {
        self.max_num.saturating_add(1000)
    }
}

impl fmt::Debug for FormSetFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormSetFactory")
            .field("extra", &self.extra)
            .field("min_num", &self.min_num)
            .field("max_num", &self.max_num)
            .field("can_delete", &self.can_delete)
            .field("inline", &self.inline)
            .finish_non_exhaustive()
    }
}

fn parse_count(data: &FormData, prefix: &str, field: &str) -> Option<usize> {
    data.get(&format!("{prefix}-{field}"))
        .and_then(|v| v.trim().parse::<usize>().ok())
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "true" | "1" | "on" | "yes")
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "form"
    } else {
        "forms"
    }
}

/// A bound or unbound set of forms built by a [`FormSetFactory`].
pub struct FormSet {
    forms: Vec<Box<dyn Form>>,
    prefix: String,
    auto_id: String,
    label_suffix: Option<String>,
    bound: bool,
    data: FormData,
    initial_form_count: usize,
    management_ok: bool,
    factory: FormSetFactory,
    errors: Option<Vec<ErrorDict>>,
    non_form_errors: ErrorList,
}

impl FormSet {
    /// Returns the formset prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the HTML id template.
    pub fn auto_id(&self) -> &str {
        &self.auto_id
    }

    /// Returns the prefix of the form at `index`.
    pub fn add_prefix(&self, index: impl fmt::Display) -> String {
        format!("{}-{index}", self.prefix)
    }

    /// Returns `true` if the formset was given data or files.
    pub const fn is_bound(&self) -> bool {
        self.bound
    }

    /// Returns every form.
    pub fn forms(&self) -> &[Box<dyn Form>] {
        &self.forms
    }

    /// Returns the form at `index` for mutation.
    pub fn form_mut(&mut self, index: usize) -> Option<&mut (dyn Form + 'static)> {
        self.forms.get_mut(index).map(|f| &mut **f)
    }

    /// Returns the forms bound to existing rows.
    pub fn initial_forms(&self) -> &[Box<dyn Form>] {
        &self.forms[..self.initial_form_count]
    }

    /// Returns the blank forms after the initial ones.
    pub fn extra_forms(&self) -> &[Box<dyn Form>] {
        &self.forms[self.initial_form_count..]
    }

    /// Returns the number of forms.
    pub fn total_form_count(&self) -> usize {
        self.forms.len()
    }

    /// Returns the number of forms bound to existing rows.
    pub const fn initial_form_count(&self) -> usize {
        self.initial_form_count
    }

    /// Returns `true` if forms can be marked for deletion.
    pub const fn can_delete(&self) -> bool {
        self.factory.can_delete
    }

    /// Returns the minimum number of forms.
    pub const fn min_num(&self) -> usize {
        self.factory.min_num
    }

    /// Returns the maximum number of forms.
    pub const fn max_num(&self) -> usize {
        self.factory.max_num
    }

    /// Returns the inline configuration, if this is an inline formset.
    pub const fn inline(&self) -> Option<&InlineConfig> {
        self.factory.inline.as_ref()
    }

    /// Returns `true` if the form at `index` is marked for deletion.
    pub fn should_delete_form(&self, index: usize) -> bool {
        if !self.bound || !self.factory.can_delete {
            return false;
        }
        self.forms.get(index).is_some_and(|form| {
            self.data
                .get(&form.add_prefix(DELETION_FIELD_NAME))
                .is_some_and(is_truthy)
        })
    }

    /// Returns `true` if any form's data differs from its initial data.
    pub fn has_changed(&self) -> bool {
        self.forms.iter().any(|f| f.has_changed())
    }

    /// Returns the indices of the forms that count: initial forms plus
    /// changed extra forms, minus those marked for deletion.
    pub fn active_form_indices(&self) -> Vec<usize> {
        (0..self.forms.len())
            .filter(|&i| i < self.initial_form_count || self.forms[i].has_changed())
            .filter(|&i| !self.should_delete_form(i))
            .collect()
    }

    /// Returns the management data for the current forms.
    pub fn management_form_data(&self) -> FormData {
        let mut data = FormData::new();
        data.set(self.add_prefix(TOTAL_FORMS), self.total_form_count().to_string());
        data.set(self.add_prefix(INITIAL_FORMS), self.initial_form_count.to_string());
        data.set(self.add_prefix(MIN_NUM_FORMS), self.factory.min_num.to_string());
        data.set(self.add_prefix(MAX_NUM_FORMS), self.factory.max_num.to_string());
        data
    }

    /// Returns an unbound blank form whose prefix carries
    /// [`PREFIX_PLACEHOLDER`] in place of an index.
    pub fn empty_form(&self) -> Box<dyn Form> {
        let options = FormOptions {
            prefix: Some(self.add_prefix(PREFIX_PLACEHOLDER)),
            auto_id: Some(self.auto_id.clone()),
            label_suffix: self.label_suffix.clone(),
            empty_permitted: true,
            ..FormOptions::default()
        };
        (self.factory.constructor)(&options)
    }

    fn full_clean(&mut self) {
        let mut errors = Vec::with_capacity(self.forms.len());
        let mut non_form = ErrorList::new();

        if !self.bound {
            self.errors = Some(errors);
            self.non_form_errors = non_form;
            return;
        }

        if !self.management_ok {
            non_form.push(format!(
                "ManagementForm data is missing or has been tampered with. Missing fields: {}-{TOTAL_FORMS}, {}-{INITIAL_FORMS}.",
                self.prefix, self.prefix
            ));
        }

        let mut empty_forms = 0;
        let mut deleted_forms = 0;
        for i in 0..self.forms.len() {
            let empty = i >= self.initial_form_count && !self.forms[i].has_changed();
            if empty {
                empty_forms += 1;
            }
            if self.should_delete_form(i) {
                // An untouched extra form is already counted as empty.
                if !empty {
                    deleted_forms += 1;
                }
                errors.push(ErrorDict::new());
                continue;
            }
            errors.push(self.forms[i].errors().clone());
        }

        let count = self
            .forms
            .len()
            .saturating_sub(deleted_forms + empty_forms);
        let factory = &self.factory;
        if factory.validate_max && count > factory.max_num {
            non_form.push(format!(
                "Please submit at most {} {}.",
                factory.max_num,
                plural(factory.max_num)
            ));
        }
        if factory.validate_min && count < factory.min_num {
            non_form.push(format!(
                "Please submit at least {} {}.",
                factory.min_num,
                plural(factory.min_num)
            ));
        }

        tracing::trace!(prefix = %self.prefix, count, deleted_forms, "formset cleaned");
        self.errors = Some(errors);
        self.non_form_errors = non_form;
    }

    /// Returns one error dict per form, cleaning first if needed. Forms
    /// marked for deletion report no errors.
    pub fn errors(&mut self) -> &[ErrorDict] {
        if self.errors.is_none() {
            self.full_clean();
        }
        self.errors.as_deref().unwrap_or(&[])
    }

    /// Returns errors that belong to the formset as a whole.
    pub fn non_form_errors(&mut self) -> &ErrorList {
        if self.errors.is_none() {
            self.full_clean();
        }
        &self.non_form_errors
    }

    /// Returns the total number of form and non-form errors.
    pub fn total_error_count(&mut self) -> usize {
        let form_errors: usize = self
            .errors()
            .iter()
            .map(|e| e.values().map(ErrorList::len).sum::<usize>())
            .sum();
        form_errors + self.non_form_errors.len()
    }

    /// Returns `true` if the formset is bound and neither any form nor the
    /// formset itself has errors.
    pub fn is_valid(&mut self) -> bool {
        if !self.bound {
            return false;
        }
        let forms_valid = self.errors().iter().all(ErrorDict::is_empty);
        forms_valid && self.non_form_errors.is_empty()
    }

    /// Returns each form's cleaned data.
    pub fn cleaned_data(&self) -> Vec<&HashMap<String, Value>> {
        self.forms.iter().map(|f| f.cleaned_data()).collect()
    }

    /// Saves the active forms as children of `instance`, returning the rows.
    ///
    /// With `commit` unset the rows are returned without touching the
    /// instance. Only inline formsets can be saved.
    pub fn save(
        &mut self,
        instance: &mut dyn Model,
        commit: bool,
    ) -> RebarResult<Vec<HashMap<String, Value>>> {
        let Some(inline) = self.factory.inline.clone() else {
            return Err(RebarError::ImproperlyConfigured(format!(
                "formset '{}' has no parent relation; build it with `with_fk`",
                self.prefix
            )));
        };
        if !self.is_valid() {
            return Err(ValidationError::invalid(format!(
                "The {} could not be saved because the data didn't validate.",
                inline.relation
            ))
            .into());
        }

        let rows: Vec<HashMap<String, Value>> = self
            .active_form_indices()
            .into_iter()
            .map(|i| self.forms[i].cleaned_data().clone())
            .collect();

        if commit {
            instance.add_children(&inline.relation, &inline.fk_name, rows.clone())?;
        }
        tracing::debug!(prefix = %self.prefix, rows = rows.len(), commit, "inline formset saved");
        Ok(rows)
    }
}

impl fmt::Debug for FormSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormSet")
            .field("prefix", &self.prefix)
            .field("bound", &self.bound)
            .field("total", &self.forms.len())
            .field("initial", &self.initial_form_count)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}
