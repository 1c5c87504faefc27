//! Forms with per-state validators.

use std::any::Any;

use rebar_rs_core::RebarResult;

use crate::error_list::ErrorDict;
use crate::form::{BaseForm, Form, Saveable};
use crate::state::{form_is_valid_for, form_state_errors, StateRules, StateValidatorSet};

/// Wraps any [`Form`] with its own [`StateValidatorSet`].
///
/// Plain validation is unchanged; [`is_valid_for`](Self::is_valid_for) and
/// [`state_errors`](Self::state_errors) add the conditional checks. Groups
/// find the validators through [`Form::state_validators`].
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::fields::{FormFieldDef, FormFieldType};
/// use rebar_rs_forms::form::BaseForm;
/// use rebar_rs_forms::state::{statevalidator_factory, StateRules};
/// use rebar_rs_forms::state_form::StateValidatedForm;
/// use rebar_rs_forms::validators::required;
///
/// let mut rules = StateRules::new();
/// rules.insert("publish".into(), statevalidator_factory([("title", vec![required()])]).into());
///
/// let form = BaseForm::new(vec![
///     FormFieldDef::new("title", FormFieldType::char()).required(false),
/// ]);
/// let mut form = StateValidatedForm::new(form, &rules);
/// assert!(!form.is_valid_for(&["publish"]).unwrap());
/// ```
#[derive(Debug)]
pub struct StateValidatedForm<F> {
    form: F,
    validators: StateValidatorSet,
}

impl<F: Form> StateValidatedForm<F> {
    /// Wraps `form`, building fresh validators from `rules`.
    pub fn new(form: F, rules: &StateRules) -> Self {
        Self {
            form,
            validators: StateValidatorSet::from_rules(rules),
        }
    }

    /// Returns `true` if the form passes every state in `states`.
    ///
    /// With no states this is plain [`Form::is_valid`].
    pub fn is_valid_for(&mut self, states: &[&str]) -> RebarResult<bool> {
        form_is_valid_for(self, states)
    }

    /// Returns the errors for `state`.
    pub fn state_errors(&mut self, state: &str) -> RebarResult<ErrorDict> {
        form_state_errors(self, state)
    }

    /// Returns the wrapped form.
    pub const fn inner(&self) -> &F {
        &self.form
    }

    /// Returns the wrapped form for mutation.
    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.form
    }

    /// Unwraps the form.
    pub fn into_inner(self) -> F {
        self.form
    }
}

impl<F: Form> Form for StateValidatedForm<F> {
    fn base(&self) -> &BaseForm {
        self.form.base()
    }

    fn base_mut(&mut self) -> &mut BaseForm {
        self.form.base_mut()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn errors(&mut self) -> &ErrorDict {
        self.form.errors()
    }

    fn is_valid(&mut self) -> bool {
        self.form.is_valid()
    }

    fn has_changed(&self) -> bool {
        self.form.has_changed()
    }

    fn as_saveable(&mut self) -> Option<&mut dyn Saveable> {
        self.form.as_saveable()
    }

    fn state_validators(&self) -> Option<&StateValidatorSet> {
        Some(&self.validators)
    }

    fn state_validators_mut(&mut self) -> Option<&mut StateValidatorSet> {
        Some(&mut self.validators)
    }
}
