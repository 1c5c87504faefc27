//! Conditional (state) validation.
//!
//! A [`StateValidator`] carries field validators that must pass for an
//! object to be in some state ("published", "submitted", ...), independent of
//! the validation the form itself performs. It validates plain maps, forms,
//! formsets, and records; see [`DataSource`].
//!
//! Declarations are immutable and shared ([`StateValidatorDecl`]); each form
//! or group instance builds its own [`StateValidatorSet`] from them, so
//! enabling or disabling a validator on one instance never affects another.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rebar_rs_core::{RebarError, RebarResult};

use crate::error_list::{ErrorDict, ErrorList};
use crate::form::Form;
use crate::formset::FormSet;
use crate::model::Model;
use crate::validators::SharedValidator;
use crate::value::Value;

/// Field name to the validators it must satisfy, in declaration order.
pub type FieldRules = Vec<(String, Vec<SharedValidator>)>;

/// An immutable state validator declaration.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
///
/// use rebar_rs_forms::state::{statevalidator_factory, DataSource};
/// use rebar_rs_forms::validators::required;
/// use rebar_rs_forms::value::Value;
///
/// let decl = statevalidator_factory([("title", vec![required()])]);
/// let mut validator = decl.new_validator();
///
/// let empty: HashMap<String, Value> = HashMap::new();
/// assert!(!validator.is_valid(DataSource::Map(&empty)));
///
/// validator.disable();
/// assert!(validator.is_valid(DataSource::Map(&empty)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StateValidatorDecl {
    rules: Arc<FieldRules>,
}

impl StateValidatorDecl {
    /// Returns a fresh, enabled validator.
    pub fn new_validator(&self) -> StateValidator {
        StateValidator {
            decl: self.clone(),
            enabled: true,
        }
    }

    /// Returns the declared field names in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the field rules.
    pub fn rules(&self) -> &FieldRules {
        &self.rules
    }
}

/// Builds a [`StateValidatorDecl`] from field → validators pairs.
///
/// Repeated field names accumulate their validators under the first
/// occurrence.
pub fn statevalidator_factory<I, K>(field_validators: I) -> StateValidatorDecl
where
    I: IntoIterator<Item = (K, Vec<SharedValidator>)>,
    K: Into<String>,
{
    let mut rules: FieldRules = Vec::new();
    for (field, validators) in field_validators {
        let field = field.into();
        match rules.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => existing.extend(validators),
            None => rules.push((field, validators)),
        }
    }
    StateValidatorDecl {
        rules: Arc::new(rules),
    }
}

/// What a [`StateValidator`] can validate.
pub enum DataSource<'a> {
    /// A plain mapping, e.g. a form's cleaned data.
    Map(&'a HashMap<String, Value>),
    /// A form: its cleaned data if bound and valid, else its initial values.
    Form(&'a mut dyn Form),
    /// A formset: each form that counts, see [`FormSet::active_form_indices`].
    FormSet(&'a mut FormSet),
    /// A record's field values.
    Model(&'a dyn Model),
}

impl<'a> From<&'a HashMap<String, Value>> for DataSource<'a> {
    fn from(map: &'a HashMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

/// Errors from one validation: a dict for single objects, one dict per
/// validated form for formsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateErrors {
    /// Errors for a map, form, or record.
    Fields(ErrorDict),
    /// Errors for each validated form of a formset.
    Forms(Vec<ErrorDict>),
}

impl StateErrors {
    /// Returns `true` if there are no errors at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Fields(errors) => errors.is_empty(),
            Self::Forms(forms) => forms.iter().all(ErrorDict::is_empty),
        }
    }

    /// Returns the field errors, if this is [`StateErrors::Fields`].
    pub fn into_fields(self) -> Option<ErrorDict> {
        match self {
            Self::Fields(errors) => Some(errors),
            Self::Forms(_) => None,
        }
    }

    /// Returns the per-form errors, if this is [`StateErrors::Forms`].
    pub fn into_forms(self) -> Option<Vec<ErrorDict>> {
        match self {
            Self::Forms(forms) => Some(forms),
            Self::Fields(_) => None,
        }
    }
}

/// A toggleable set of field validators for one state.
#[derive(Debug, Clone)]
pub struct StateValidator {
    decl: StateValidatorDecl,
    enabled: bool,
}

impl StateValidator {
    /// Returns `true` unless the validator was disabled.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables the validator.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disables the validator; it then reports no errors.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Returns the declaration this validator was built from.
    pub const fn decl(&self) -> &StateValidatorDecl {
        &self.decl
    }

    /// Returns `true` if validating `source` produces no errors.
    pub fn is_valid(&self, source: DataSource<'_>) -> bool {
        self.errors(source).is_empty()
    }

    /// Validates `source`.
    pub fn errors(&self, source: DataSource<'_>) -> StateErrors {
        match source {
            DataSource::Map(map) => StateErrors::Fields(self.validate(map)),
            DataSource::Form(form) => StateErrors::Fields(self.form_errors(form)),
            DataSource::FormSet(formset) => StateErrors::Forms(self.formset_errors(formset)),
            DataSource::Model(record) => {
                let data = self
                    .decl
                    .fields()
                    .map(|f| (f.to_string(), record.field_value(f).unwrap_or(Value::Null)))
                    .collect();
                StateErrors::Fields(self.validate(&data))
            }
        }
    }

    /// Runs every declared validator against `data`.
    ///
    /// Absent fields validate as `Null`. Fields without errors are omitted.
    pub fn validate(&self, data: &HashMap<String, Value>) -> ErrorDict {
        let mut errors = ErrorDict::new();
        if !self.enabled {
            return errors;
        }

        for (field, validators) in self.decl.rules.iter() {
            let value = data.get(field).unwrap_or(&Value::Null);
            let messages: ErrorList = validators
                .iter()
                .filter_map(|v| v.validate(value).err())
                .flat_map(|e| e.messages())
                .collect();
            if !messages.is_empty() {
                errors.insert(field.clone(), messages);
            }
        }
        errors
    }

    /// Validates a form: cleaned data when bound and valid, otherwise each
    /// declared field's initial value, falling back to its current value.
    pub fn form_errors(&self, form: &mut dyn Form) -> ErrorDict {
        if form.is_bound() && form.is_valid() {
            return self.validate(form.cleaned_data());
        }
        let data = self
            .decl
            .fields()
            .map(|f| {
                let value = form
                    .initial()
                    .get(f)
                    .cloned()
                    .unwrap_or_else(|| form.value(f));
                (f.to_string(), value)
            })
            .collect();
        self.validate(&data)
    }

    /// Validates each form of `formset` that counts, in order.
    pub fn formset_errors(&self, formset: &mut FormSet) -> Vec<ErrorDict> {
        formset
            .active_form_indices()
            .into_iter()
            .filter_map(|i| formset.form_mut(i).map(|form| self.form_errors(form)))
            .collect()
    }
}

/// How a state's validator is declared.
#[derive(Debug, Clone)]
pub enum StateRule {
    /// Build a fresh validator from a declaration.
    Decl(StateValidatorDecl),
    /// Copy an existing validator, keeping its enabled flag.
    Validator(StateValidator),
}

impl StateRule {
    /// Returns a validator owned by the caller.
    pub fn instantiate(&self) -> StateValidator {
        match self {
            Self::Decl(decl) => decl.new_validator(),
            Self::Validator(validator) => validator.clone(),
        }
    }
}

impl From<StateValidatorDecl> for StateRule {
    fn from(decl: StateValidatorDecl) -> Self {
        Self::Decl(decl)
    }
}

impl From<StateValidator> for StateRule {
    fn from(validator: StateValidator) -> Self {
        Self::Validator(validator)
    }
}

impl From<FieldRules> for StateRule {
    fn from(rules: FieldRules) -> Self {
        Self::Decl(statevalidator_factory(rules))
    }
}

/// State name to rule, as declared on a form or group type.
pub type StateRules = BTreeMap<String, StateRule>;

/// The validators one form or group instance owns, keyed by state.
#[derive(Debug, Clone, Default)]
pub struct StateValidatorSet {
    validators: BTreeMap<String, StateValidator>,
}

impl StateValidatorSet {
    /// Builds fresh validators for every rule.
    pub fn from_rules(rules: &StateRules) -> Self {
        Self {
            validators: rules
                .iter()
                .map(|(state, rule)| (state.clone(), rule.instantiate()))
                .collect(),
        }
    }

    /// Returns the validator for `state`.
    pub fn get(&self, state: &str) -> RebarResult<&StateValidator> {
        self.validators
            .get(state)
            .ok_or_else(|| RebarError::UnknownState(state.to_string()))
    }

    /// Returns the validator for `state` for toggling.
    pub fn get_mut(&mut self, state: &str) -> RebarResult<&mut StateValidator> {
        self.validators
            .get_mut(state)
            .ok_or_else(|| RebarError::UnknownState(state.to_string()))
    }

    /// Adds or replaces the validator for `state`.
    pub fn insert(&mut self, state: impl Into<String>, validator: StateValidator) {
        self.validators.insert(state.into(), validator);
    }

    /// Returns the state names in order.
    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }

    /// Returns `true` if no states are declared.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Returns the number of states.
    pub fn len(&self) -> usize {
        self.validators.len()
    }
}

/// Validates `form` for every state in `states`.
///
/// With no states this is the form's own [`Form::is_valid`].
pub fn form_is_valid_for(form: &mut dyn Form, states: &[&str]) -> RebarResult<bool> {
    if states.is_empty() {
        return Ok(form.is_valid());
    }
    let validators = form
        .state_validators()
        .cloned()
        .ok_or_else(|| RebarError::ImproperlyConfigured("form has no state validators".into()))?;
    for state in states {
        if !validators.get(state)?.is_valid(DataSource::Form(&mut *form)) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Returns the errors `form` has for `state`.
pub fn form_state_errors(form: &mut dyn Form, state: &str) -> RebarResult<ErrorDict> {
    let validators = form
        .state_validators()
        .cloned()
        .ok_or_else(|| RebarError::ImproperlyConfigured("form has no state validators".into()))?;
    let validator = validators.get(state)?;
    Ok(validator.form_errors(form))
}
