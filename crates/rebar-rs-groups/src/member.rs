//! Group members and their declarations.
//!
//! A [`MemberDecl`] pairs a member name with a constructor. When a group is
//! built, every constructor receives the same [`MemberArgs`] apart from the
//! prefix (`<group-prefix>-<member-name>`) and its own options, and returns a
//! [`Member`]: a single form or a formset.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use rebar_rs_core::{RebarError, RebarResult};
use rebar_rs_forms::data::{FileData, FormData};
use rebar_rs_forms::error_list::{ErrorDict, ErrorList};
use rebar_rs_forms::form::{Form, FormOptions};
use rebar_rs_forms::formset::{FormSet, FormSetFactory, FormSetOptions};
use rebar_rs_forms::model::Model;
use rebar_rs_forms::value::Value;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Extra constructor arguments for one member, keyed by argument name.
pub type MemberOptions = HashMap<String, Value>;

/// Builds a member from the group's arguments.
pub type MemberConstructor = Arc<dyn Fn(&MemberArgs<'_>) -> Member + Send + Sync>;

/// What a member constructor receives.
#[derive(Debug, Clone, Copy)]
pub struct MemberArgs<'a> {
    /// The group's data, shared by every member.
    pub data: Option<&'a FormData>,
    /// The group's files, shared by every member.
    pub files: Option<&'a FileData>,
    /// `<group-prefix>-<member-name>`.
    pub prefix: &'a str,
    /// The group's initial values.
    pub initial: &'a HashMap<String, Value>,
    /// The backing instance, if the group has one.
    pub instance: Option<&'a dyn Model>,
    /// HTML id template.
    pub auto_id: &'a str,
    /// Suffix for field labels.
    pub label_suffix: &'a str,
    /// Options given for this member by name, if any.
    pub options: Option<&'a MemberOptions>,
}

impl<'a> MemberArgs<'a> {
    /// Options for building a single form from these arguments.
    pub fn form_options(&self) -> FormOptions<'a> {
        FormOptions {
            data: self.data,
            files: self.files,
            prefix: Some(self.prefix.to_string()),
            initial: Some(self.initial),
            auto_id: Some(self.auto_id.to_string()),
            label_suffix: Some(self.label_suffix.to_string()),
            empty_permitted: false,
        }
    }

    /// Options for building a formset from these arguments.
    pub fn formset_options(&self) -> FormSetOptions<'a> {
        FormSetOptions {
            data: self.data,
            files: self.files,
            prefix: Some(self.prefix.to_string()),
            initial: None,
            auto_id: Some(self.auto_id.to_string()),
            label_suffix: Some(self.label_suffix.to_string()),
        }
    }

    /// Returns the option `key` given for this member.
    pub fn option(&self, key: &str) -> Option<&'a Value> {
        self.options.and_then(|o| o.get(key))
    }
}

/// One constituent of a group.
pub enum Member {
    /// A single form.
    Form(Box<dyn Form>),
    /// A collection of forms.
    FormSet(FormSet),
}

impl Member {
    /// Wraps a form.
    pub fn form<F: Form>(form: F) -> Self {
        Self::Form(Box::new(form))
    }

    /// Returns the member's prefix.
    pub fn prefix(&self) -> Option<&str> {
        match self {
            Self::Form(form) => form.prefix(),
            Self::FormSet(formset) => Some(formset.prefix()),
        }
    }

    /// Returns `true` if the member was given data or files.
    pub fn is_bound(&self) -> bool {
        match self {
            Self::Form(form) => form.is_bound(),
            Self::FormSet(formset) => formset.is_bound(),
        }
    }

    /// Validates the member if needed and returns its errors.
    pub fn errors(&mut self) -> MemberErrors {
        match self {
            Self::Form(form) => MemberErrors::Form(form.errors().clone()),
            Self::FormSet(formset) => MemberErrors::FormSet {
                forms: formset.errors().to_vec(),
                non_form: formset.non_form_errors().clone(),
            },
        }
    }

    /// Returns `true` if the member is bound and valid.
    pub fn is_valid(&mut self) -> bool {
        match self {
            Self::Form(form) => form.is_valid(),
            Self::FormSet(formset) => formset.is_valid(),
        }
    }

    /// Returns the HTML id of `field` within this member.
    pub fn html_id(&self, field: &str) -> String {
        match self {
            Self::Form(form) => form.html_id(field),
            Self::FormSet(formset) => formset
                .auto_id()
                .replace("%s", &formset.add_prefix(field)),
        }
    }

    /// Returns the form, if this member is one.
    pub fn as_form(&self) -> Option<&dyn Form> {
        match self {
            Self::Form(form) => Some(&**form),
            Self::FormSet(_) => None,
        }
    }

    /// Returns the form for mutation, if this member is one.
    pub fn as_form_mut(&mut self) -> Option<&mut (dyn Form + 'static)> {
        match self {
            Self::Form(form) => Some(&mut **form),
            Self::FormSet(_) => None,
        }
    }

    /// Returns the formset, if this member is one.
    pub const fn as_formset(&self) -> Option<&FormSet> {
        match self {
            Self::FormSet(formset) => Some(formset),
            Self::Form(_) => None,
        }
    }

    /// Returns the formset for mutation, if this member is one.
    pub fn as_formset_mut(&mut self) -> Option<&mut FormSet> {
        match self {
            Self::FormSet(formset) => Some(formset),
            Self::Form(_) => None,
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Form(form) => f.debug_tuple("Form").field(form).finish(),
            Self::FormSet(formset) => f.debug_tuple("FormSet").field(formset).finish(),
        }
    }
}

impl From<FormSet> for Member {
    fn from(formset: FormSet) -> Self {
        Self::FormSet(formset)
    }
}

impl From<Box<dyn Form>> for Member {
    fn from(form: Box<dyn Form>) -> Self {
        Self::Form(form)
    }
}

/// A member's errors.
///
/// Independent of the owning group's error container, which only holds
/// the group clean hook's errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberErrors {
    /// Per-field errors of a form.
    Form(ErrorDict),
    /// Per-form errors of a formset plus its own errors.
    FormSet {
        /// One dict per form.
        forms: Vec<ErrorDict>,
        /// Errors of the formset as a whole.
        non_form: ErrorList,
    },
}

impl MemberErrors {
    /// Returns `true` if the member has no errors.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Form(errors) => errors.is_empty(),
            Self::FormSet { forms, non_form } => {
                forms.iter().all(ErrorDict::is_empty) && non_form.is_empty()
            }
        }
    }

    /// Returns the errors of `field`, if this is a form's errors.
    pub fn field(&self, field: &str) -> Option<&ErrorList> {
        match self {
            Self::Form(errors) => errors.get(field),
            Self::FormSet { .. } => None,
        }
    }
}

/// A named member constructor.
#[derive(Clone)]
pub struct MemberDecl {
    name: String,
    constructor: MemberConstructor,
}

impl MemberDecl {
    /// Declares a member named `name`.
    ///
    /// Fails if `name` is not a valid identifier.
    pub fn new<F>(name: impl Into<String>, constructor: F) -> RebarResult<Self>
    where
        F: Fn(&MemberArgs<'_>) -> Member + Send + Sync + 'static,
    {
        let name = name.into();
        validate_member_name(&name)?;
        Ok(Self {
            name,
            constructor: Arc::new(constructor),
        })
    }

    /// Declares a form member named after the form type: the type name,
    /// lowercased, without a trailing `form` (`NameForm` becomes `name`).
    ///
    /// # Examples
    ///
    /// ```
    /// use rebar_rs_forms::form::BaseForm;
    /// use rebar_rs_groups::member::MemberDecl;
    ///
    /// let decl = MemberDecl::for_type(|args| BaseForm::new(vec![]).with_options(&args.form_options()))
    ///     .unwrap();
    /// assert_eq!(decl.name(), "base");
    /// ```
    pub fn for_type<T, F>(constructor: F) -> RebarResult<Self>
    where
        T: Form,
        F: Fn(&MemberArgs<'_>) -> T + Send + Sync + 'static,
    {
        Self::new(type_member_name::<T>(), move |args| {
            Member::Form(Box::new(constructor(args)))
        })
    }

    /// Declares a form member named `name`.
    pub fn form<T, F>(name: impl Into<String>, constructor: F) -> RebarResult<Self>
    where
        T: Form,
        F: Fn(&MemberArgs<'_>) -> T + Send + Sync + 'static,
    {
        Self::new(name, move |args| Member::Form(Box::new(constructor(args))))
    }

    /// Declares a formset member named `name` built by `factory`.
    pub fn formset(name: impl Into<String>, factory: FormSetFactory) -> RebarResult<Self> {
        Self::new(name, move |args| {
            Member::FormSet(factory.build(&args.formset_options()))
        })
    }

    /// Returns the member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds the member.
    pub fn construct(&self, args: &MemberArgs<'_>) -> Member {
        (self.constructor)(args)
    }
}

impl fmt::Debug for MemberDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDecl")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Fails unless `name` is a valid identifier.
pub fn validate_member_name(name: &str) -> RebarResult<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(RebarError::ImproperlyConfigured(format!(
            "member name '{name}' is not a valid identifier"
        )))
    }
}

fn type_member_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base).to_lowercase();
    match short.strip_suffix("form") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => short,
    }
}
