//! # rebar-rs
//!
//! Form groups and state validators.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `rebar-rs` to get everything, or on individual crates
//! for finer-grained control.

/// Settings, logging setup, and error types.
pub use rebar_rs_core as core;

/// Forms, model forms, formsets, and state validators.
pub use rebar_rs_forms as forms;

/// Form groups.
#[cfg(feature = "groups")]
pub use rebar_rs_groups as groups;

/// Testing helpers.
#[cfg(feature = "testing")]
pub use rebar_rs_test as test;

// Third-party re-exports
pub use chrono;
pub use serde;
pub use serde_json;
pub use tracing;
pub use tracing_subscriber;

/// Commonly used types.
///
/// ```
/// use rebar_rs::prelude::*;
///
/// let form = BaseForm::new(vec![FormFieldDef::new("title", FormFieldType::char())]);
/// assert!(!form.is_bound());
/// ```
pub mod prelude {
    pub use rebar_rs_core::{RebarError, RebarResult, Settings, ValidationError, SETTINGS};
    pub use rebar_rs_forms::{
        statevalidator_factory, BaseForm, DataSource, ErrorContainer, ErrorDict, ErrorList,
        FileData, Form, FormData, FormFieldDef, FormFieldType, FormSet, FormSetFactory,
        FormSetOptions, Model, ModelForm, Record, Saveable, StateErrors, StateValidatedForm,
        StateValidator, StateValidatorSet, Value,
    };
    pub use rebar_rs_forms::state::StateRules;

    #[cfg(feature = "groups")]
    pub use rebar_rs_groups::{
        formgroup_factory, FormGroup, FormGroupDecl, GroupArgs, Member, MemberDecl, MemberErrors,
    };
}
