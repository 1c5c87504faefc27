//! Form groups.
//!
//! A [`FormGroupDecl`] is the immutable declaration of a group: its ordered
//! members, default prefix, optional group-wide `clean` hook, and optional
//! state validators. [`FormGroupDecl::construct`] turns it into a
//! [`FormGroup`] bound (or not) to submitted data.
//!
//! Validation is memoised per group: the first call to
//! [`FormGroup::is_valid`] or [`FormGroup::errors`] validates every member
//! and runs the `clean` hook once; later calls reuse the result.
//!
//! Saving runs in three phases so that relations needing the backing
//! instance's identity are written only after it exists:
//!
//! 1. `save(commit = false)` on every form member that can save;
//! 2. the backing instance is persisted;
//! 3. post-commit hooks run on form members, then inline formsets save.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rebar_rs_core::logging::group_span;
use rebar_rs_core::{RebarError, RebarResult, ValidationError, SETTINGS};
use rebar_rs_forms::data::{FileData, FormData};
use rebar_rs_forms::error_list::{ErrorContainer, ErrorDict, ErrorList};
use rebar_rs_forms::form::Form;
use rebar_rs_forms::formset::FormSet;
use rebar_rs_forms::model::Model;
use rebar_rs_forms::state::{
    form_is_valid_for, form_state_errors, StateRules, StateValidatorSet,
};
use rebar_rs_forms::value::Value;

use crate::member::{Member, MemberArgs, MemberDecl, MemberErrors, MemberOptions};

/// Group-wide validation run after every member validated.
///
/// An error is captured as the group's errors; it never propagates.
pub type GroupCleanHook<E> =
    Arc<dyn Fn(&FormGroup<E>) -> Result<(), ValidationError> + Send + Sync>;

/// The immutable declaration of a form group.
///
/// `E` is the container used for errors raised by the group's clean hook.
/// Member errors are always reported as [`MemberErrors`], built from
/// [`ErrorDict`] and [`ErrorList`].
pub struct FormGroupDecl<E: ErrorContainer = ErrorList> {
    members: Vec<MemberDecl>,
    default_prefix: Option<String>,
    clean: Option<GroupCleanHook<E>>,
    state_rules: Option<StateRules>,
}

impl<E: ErrorContainer> FormGroupDecl<E> {
    /// Declares a group of `members`, in order.
    ///
    /// Fails if two members share a name.
    pub fn new(members: Vec<MemberDecl>) -> RebarResult<Self> {
        let mut seen = HashSet::new();
        for member in &members {
            if !seen.insert(member.name()) {
                return Err(RebarError::ImproperlyConfigured(format!(
                    "duplicate member name '{}'",
                    member.name()
                )));
            }
        }
        Ok(Self {
            members,
            default_prefix: None,
            clean: None,
            state_rules: None,
        })
    }

    /// Sets the prefix used when none is given at construction.
    #[must_use]
    pub fn with_default_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.default_prefix = Some(prefix.into());
        self
    }

    /// Sets the group-wide clean hook.
    #[must_use]
    pub fn with_clean<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FormGroup<E>) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.clean = Some(Arc::new(hook));
        self
    }

    /// Makes this a state-validated group.
    #[must_use]
    pub fn with_state_validators(mut self, rules: StateRules) -> Self {
        self.state_rules = Some(rules);
        self
    }

    /// Returns the member declarations in order.
    pub fn members(&self) -> &[MemberDecl] {
        &self.members
    }

    /// Returns the member names in order.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(MemberDecl::name)
    }

    /// Returns the prefix used when none is given at construction.
    pub fn default_prefix(&self) -> String {
        self.default_prefix
            .clone()
            .unwrap_or_else(|| SETTINGS.current_or_default().default_group_prefix)
    }

    /// Returns `true` if the group declares state validators.
    pub const fn has_state_validators(&self) -> bool {
        self.state_rules.is_some()
    }

    /// Builds a group from `args`.
    pub fn construct(&self, args: GroupArgs<'_>) -> FormGroup<E> {
        let GroupArgs {
            data,
            files,
            initial,
            instance,
            prefix,
            auto_id,
            label_suffix,
            member_options,
        } = args;

        let settings = SETTINGS.current_or_default();
        let prefix = prefix.unwrap_or_else(|| self.default_prefix());
        let auto_id = auto_id.unwrap_or(settings.auto_id);
        let label_suffix = label_suffix.unwrap_or(settings.label_suffix);
        let initial = initial.unwrap_or_default();
        let bound = data.is_some() || files.is_some();

        let members = self
            .members
            .iter()
            .map(|decl| {
                let member_prefix = format!("{prefix}-{}", decl.name());
                let member_args = MemberArgs {
                    data,
                    files,
                    prefix: &member_prefix,
                    initial: &initial,
                    instance: instance.as_deref(),
                    auto_id: &auto_id,
                    label_suffix: &label_suffix,
                    options: member_options.get(decl.name()),
                };
                (decl.name().to_string(), decl.construct(&member_args))
            })
            .collect::<Vec<_>>();

        tracing::debug!(%prefix, members = members.len(), bound, "form group constructed");

        FormGroup {
            members,
            prefix,
            auto_id,
            label_suffix,
            bound,
            data: data.cloned().unwrap_or_default(),
            files: files.cloned().unwrap_or_default(),
            initial,
            instance,
            clean: self.clean.clone(),
            state_validators: self.state_rules.as_ref().map(StateValidatorSet::from_rules),
            errors: None,
            group_errors: None,
        }
    }
}

impl<E: ErrorContainer> Clone for FormGroupDecl<E> {
    fn clone(&self) -> Self {
        Self {
            members: self.members.clone(),
            default_prefix: self.default_prefix.clone(),
            clean: self.clean.clone(),
            state_rules: self.state_rules.clone(),
        }
    }
}

impl<E: ErrorContainer> fmt::Debug for FormGroupDecl<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormGroupDecl")
            .field("members", &self.members)
            .field("default_prefix", &self.default_prefix)
            .field("clean", &self.clean.is_some())
            .field("state_rules", &self.state_rules)
            .finish()
    }
}

/// Builds a group declaration from `members`.
///
/// The default prefix and clean hook are inherited from `base` when given.
/// Passing `state_validators` makes the group state-validated; otherwise
/// the base's state validators, if any, are kept.
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::fields::{FormFieldDef, FormFieldType};
/// use rebar_rs_forms::form::BaseForm;
/// use rebar_rs_groups::{formgroup_factory, GroupArgs, MemberDecl};
///
/// let name = MemberDecl::form("name", |args| {
///     BaseForm::new(vec![FormFieldDef::new("first_name", FormFieldType::char())])
///         .with_options(&args.form_options())
/// })
/// .unwrap();
///
/// let decl = formgroup_factory::<rebar_rs_forms::ErrorList>(vec![name], None, None).unwrap();
/// let mut group = decl.construct(GroupArgs::default());
/// assert_eq!(group.len(), 1);
/// assert!(!group.is_valid());
/// assert!(group.errors().is_empty());
/// ```
pub fn formgroup_factory<E: ErrorContainer>(
    members: Vec<MemberDecl>,
    base: Option<&FormGroupDecl<E>>,
    state_validators: Option<StateRules>,
) -> RebarResult<FormGroupDecl<E>> {
    let mut decl = FormGroupDecl::new(members)?;
    if let Some(base) = base {
        decl.default_prefix = base.default_prefix.clone();
        decl.clean = base.clean.clone();
        decl.state_rules = base.state_rules.clone();
    }
    if let Some(rules) = state_validators {
        decl.state_rules = Some(rules);
    }
    Ok(decl)
}

/// Construction arguments for a group. Everything is optional.
#[derive(Debug, Default)]
pub struct GroupArgs<'a> {
    /// Submitted data; the group is bound if this or `files` is set.
    pub data: Option<&'a FormData>,
    /// Uploaded files.
    pub files: Option<&'a FileData>,
    /// Initial values passed to every form member.
    pub initial: Option<HashMap<String, Value>>,
    /// The record the members populate and [`FormGroup::save`] persists.
    pub instance: Option<Box<dyn Model>>,
    /// Group prefix; defaults to the declaration's default prefix.
    pub prefix: Option<String>,
    /// HTML id template.
    pub auto_id: Option<String>,
    /// Suffix for field labels.
    pub label_suffix: Option<String>,
    /// Extra constructor options by member name.
    pub member_options: HashMap<String, MemberOptions>,
}

/// A constructed form group.
///
/// Only [`group_errors`](Self::group_errors) uses the container `E`;
/// [`errors`](Self::errors) keeps the members' own error types.
pub struct FormGroup<E: ErrorContainer = ErrorList> {
    members: Vec<(String, Member)>,
    prefix: String,
    auto_id: String,
    label_suffix: String,
    bound: bool,
    data: FormData,
    files: FileData,
    initial: HashMap<String, Value>,
    instance: Option<Box<dyn Model>>,
    clean: Option<GroupCleanHook<E>>,
    state_validators: Option<StateValidatorSet>,
    errors: Option<Vec<MemberErrors>>,
    group_errors: Option<E>,
}

impl<E: ErrorContainer> FormGroup<E> {
    /// Returns the group prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the HTML id template.
    pub fn auto_id(&self) -> &str {
        &self.auto_id
    }

    /// Returns the label suffix.
    pub fn label_suffix(&self) -> &str {
        &self.label_suffix
    }

    /// Returns `true` if the group was given data or files.
    pub const fn is_bound(&self) -> bool {
        self.bound
    }

    /// Returns the submitted data, empty when unbound.
    pub const fn data(&self) -> &FormData {
        &self.data
    }

    /// Returns the uploaded files, empty when unbound.
    pub const fn files(&self) -> &FileData {
        &self.files
    }

    /// Returns the group's initial values.
    pub const fn initial(&self) -> &HashMap<String, Value> {
        &self.initial
    }

    /// Returns the members in declaration order.
    pub fn forms(&self) -> impl ExactSizeIterator<Item = &Member> {
        self.members.iter().map(|(_, member)| member)
    }

    /// Returns the members in declaration order for mutation.
    pub fn forms_mut(&mut self) -> impl ExactSizeIterator<Item = &mut Member> {
        self.members.iter_mut().map(|(_, member)| member)
    }

    /// Returns the member names in declaration order.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the member at `index`.
    pub fn get(&self, index: usize) -> RebarResult<&Member> {
        self.members
            .get(index)
            .map(|(_, member)| member)
            .ok_or(RebarError::MemberIndexOutOfRange {
                index,
                len: self.members.len(),
            })
    }

    /// Returns the member at `index` for mutation.
    pub fn get_mut(&mut self, index: usize) -> RebarResult<&mut Member> {
        let len = self.members.len();
        self.members
            .get_mut(index)
            .map(|(_, member)| member)
            .ok_or(RebarError::MemberIndexOutOfRange { index, len })
    }

    /// Returns the member named `name`.
    pub fn member(&self, name: &str) -> RebarResult<&Member> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, member)| member)
            .ok_or_else(|| RebarError::MemberNotFound(name.to_string()))
    }

    /// Returns the member named `name` for mutation.
    pub fn member_mut(&mut self, name: &str) -> RebarResult<&mut Member> {
        self.members
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, member)| member)
            .ok_or_else(|| RebarError::MemberNotFound(name.to_string()))
    }

    /// Returns the form member `name` as its concrete type.
    pub fn form<T: Form>(&self, name: &str) -> RebarResult<&T> {
        self.member(name)?
            .as_form()
            .and_then(|form| form.as_any().downcast_ref::<T>())
            .ok_or_else(|| wrong_member_type::<T>(name))
    }

    /// Returns the form member `name` as its concrete type, for mutation.
    pub fn form_mut<T: Form>(&mut self, name: &str) -> RebarResult<&mut T> {
        self.member_mut(name)?
            .as_form_mut()
            .and_then(|form| form.as_any_mut().downcast_mut::<T>())
            .ok_or_else(|| wrong_member_type::<T>(name))
    }

    /// Returns the formset member `name`.
    pub fn formset(&self, name: &str) -> RebarResult<&FormSet> {
        self.member(name)?
            .as_formset()
            .ok_or_else(|| wrong_member_type::<FormSet>(name))
    }

    /// Returns the formset member `name` for mutation.
    pub fn formset_mut(&mut self, name: &str) -> RebarResult<&mut FormSet> {
        self.member_mut(name)?
            .as_formset_mut()
            .ok_or_else(|| wrong_member_type::<FormSet>(name))
    }

    fn full_clean(&mut self) {
        let _span = group_span(&self.prefix).entered();

        if !self.bound {
            self.errors = Some(Vec::new());
            return;
        }

        let errors: Vec<MemberErrors> = self
            .members
            .iter_mut()
            .map(|(_, member)| member.errors())
            .collect();
        self.errors = Some(errors);

        if let Some(hook) = self.clean.clone() {
            if let Err(e) = hook(&*self) {
                tracing::debug!(error = %e, "group clean raised");
                self.group_errors = Some(E::from(e.messages()));
            }
        }

        tracing::debug!(
            invalid_members = self
                .errors
                .as_ref()
                .map_or(0, |e| e.iter().filter(|m| !m.is_empty()).count()),
            group_errors = self.group_errors.as_ref().map_or(0, ErrorContainer::len),
            "form group validated"
        );
    }

    /// Returns one error entry per member, in order, validating first if
    /// needed. Empty when the group is unbound.
    pub fn errors(&mut self) -> &[MemberErrors] {
        if self.errors.is_none() {
            self.full_clean();
        }
        self.errors.as_deref().unwrap_or(&[])
    }

    /// Returns `true` if the group is bound, every member is valid, and the
    /// clean hook raised nothing.
    ///
    /// An unbound group is never valid and its members are never validated.
    pub fn is_valid(&mut self) -> bool {
        if !self.bound {
            return false;
        }
        if self.errors.is_none() {
            self.full_clean();
        }
        self.group_errors.as_ref().map_or(true, ErrorContainer::is_empty)
            && self.members.iter_mut().all(|(_, member)| member.is_valid())
    }

    /// Returns the errors raised by the clean hook, or an empty container.
    pub fn group_errors(&self) -> E {
        self.group_errors.clone().unwrap_or_default()
    }

    /// Saves every member and the backing instance, returning the instance.
    ///
    /// Fails with [`RebarError::ImproperlyConfigured`] when the group has no
    /// backing instance, and with any error a member or the instance
    /// reports.
    pub fn save(&mut self) -> RebarResult<&dyn Model> {
        let _span = group_span(&self.prefix).entered();
        let Some(instance) = self.instance.as_deref_mut() else {
            return Err(RebarError::ImproperlyConfigured(format!(
                "form group '{}' has no instance to save",
                self.prefix
            )));
        };

        for (name, member) in &mut self.members {
            if let Some(saveable) = member.as_form_mut().and_then(|f| f.as_saveable()) {
                tracing::trace!(member = %name, "saving without commit");
                saveable.save(instance, false)?;
            }
        }

        instance.save()?;
        tracing::debug!(pk = ?instance.pk(), "backing instance saved");

        for (name, member) in &mut self.members {
            if let Some(saveable) = member.as_form_mut().and_then(|f| f.as_saveable()) {
                if saveable.has_save_m2m() {
                    tracing::trace!(member = %name, "saving relations");
                    saveable.save_m2m(instance)?;
                }
                if saveable.has_save_related() {
                    tracing::trace!(member = %name, "saving related objects");
                    saveable.save_related(instance)?;
                }
            }
        }

        for (name, member) in &mut self.members {
            if let Some(formset) = member.as_formset_mut() {
                if formset.inline().is_some() {
                    tracing::trace!(member = %name, "saving formset");
                    formset.save(instance, true)?;
                }
            }
        }

        Ok(instance)
    }

    /// Returns `<prefix>-<field>`.
    pub fn add_prefix(&self, field: &str) -> String {
        format!("{}-{field}", self.prefix)
    }

    /// Returns the HTML id of `field` in the group, or in `member` if given.
    pub fn html_id(&self, field: &str, member: Option<&str>) -> RebarResult<String> {
        match member {
            Some(name) => Ok(self.member(name)?.html_id(field)),
            None => Ok(self.auto_id.replace("%s", &self.add_prefix(field))),
        }
    }

    /// Returns the backing instance.
    pub fn instance(&self) -> Option<&dyn Model> {
        self.instance.as_deref()
    }

    /// Returns the backing instance for mutation.
    pub fn instance_mut(&mut self) -> Option<&mut (dyn Model + 'static)> {
        self.instance.as_deref_mut()
    }

    /// Consumes the group, returning the backing instance.
    pub fn into_instance(self) -> Option<Box<dyn Model>> {
        self.instance
    }

    // ── State validation ─────────────────────────────────────────────

    /// Returns the group-level state validators, if declared.
    pub const fn state_validators(&self) -> Option<&StateValidatorSet> {
        self.state_validators.as_ref()
    }

    /// Returns the group-level state validators for toggling.
    pub fn state_validators_mut(&mut self) -> Option<&mut StateValidatorSet> {
        self.state_validators.as_mut()
    }

    /// Returns `true` if the group is valid for every state in `states`.
    ///
    /// With no states this is [`is_valid`](Self::is_valid). Otherwise every
    /// state-validated form member must pass each state, and so must the
    /// group's own validators against the members' combined field values.
    pub fn is_valid_for(&mut self, states: &[&str]) -> RebarResult<bool> {
        if states.is_empty() {
            return Ok(self.is_valid());
        }

        for (_, member) in &mut self.members {
            if let Some(form) = member.as_form_mut() {
                if form.state_validators().is_some() && !form_is_valid_for(form, states)? {
                    return Ok(false);
                }
            }
        }

        let validators = self.require_state_validators()?;
        let data = self.merged_field_data();
        for state in states {
            if !validators.get(state)?.validate(&data).is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns the state errors for `states`: for each state-validated
    /// form member, one entry per state, followed by one entry per state
    /// from the group's own validators.
    pub fn state_errors(&mut self, states: &[&str]) -> RebarResult<Vec<ErrorDict>> {
        let mut errors = Vec::new();
        for (_, member) in &mut self.members {
            if let Some(form) = member.as_form_mut() {
                if form.state_validators().is_some() {
                    for state in states {
                        errors.push(form_state_errors(form, state)?);
                    }
                }
            }
        }

        let validators = self.require_state_validators()?;
        let data = self.merged_field_data();
        for state in states {
            errors.push(validators.get(state)?.validate(&data));
        }
        Ok(errors)
    }

    fn require_state_validators(&self) -> RebarResult<StateValidatorSet> {
        self.state_validators.clone().ok_or_else(|| {
            RebarError::ImproperlyConfigured(format!(
                "form group '{}' declares no state validators",
                self.prefix
            ))
        })
    }

    /// Combines the field values of every form member: cleaned data for
    /// bound, valid members, initial or current values otherwise. Later
    /// members win on name clashes.
    fn merged_field_data(&mut self) -> HashMap<String, Value> {
        let mut data = HashMap::new();
        for (_, member) in &mut self.members {
            let Some(form) = member.as_form_mut() else {
                continue;
            };
            if form.is_bound() && form.is_valid() {
                data.extend(form.cleaned_data().iter().map(|(k, v)| (k.clone(), v.clone())));
                continue;
            }
            for field in form.fields() {
                let value = form
                    .initial()
                    .get(&field.name)
                    .cloned()
                    .unwrap_or_else(|| form.value(&field.name));
                data.insert(field.name.clone(), value);
            }
        }
        data
    }
}

impl<E: ErrorContainer> fmt::Debug for FormGroup<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormGroup")
            .field("prefix", &self.prefix)
            .field("bound", &self.bound)
            .field("members", &self.members)
            .field("instance", &self.instance)
            .field("errors", &self.errors)
            .field("group_errors", &self.group_errors)
            .finish_non_exhaustive()
    }
}

fn wrong_member_type<T>(name: &str) -> RebarError {
    RebarError::ImproperlyConfigured(format!(
        "member '{name}' is not a {}",
        std::any::type_name::<T>()
    ))
}
