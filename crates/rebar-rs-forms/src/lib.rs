//! # rebar-rs-forms
//!
//! The forms framework form groups are built on: typed values, submitted
//! data, field definitions with validation, forms, record-backed model forms,
//! formsets, and conditional (state) validators.
//!
//! ## Modules
//!
//! - [`value`] - Backend-agnostic field values
//! - [`data`] - Submitted form data and uploaded files
//! - [`error_list`] - Error containers
//! - [`validators`] - Reusable field validators
//! - [`fields`] - Field definitions and type-level cleaning
//! - [`validation`] - The per-form validation pipeline
//! - [`form`] - The `Form` trait and `BaseForm`
//! - [`model`] - The `Model` persistence seam and in-memory `Record`
//! - [`model_form`] - Forms that save onto a record
//! - [`formset`] - Repeated forms with management data
//! - [`state`] - State validators
//! - [`state_form`] - Forms carrying state validators

pub mod data;
pub mod error_list;
pub mod fields;
pub mod form;
pub mod formset;
pub mod model;
pub mod model_form;
pub mod state;
pub mod state_form;
pub mod validation;
pub mod validators;
pub mod value;

pub use data::{FileData, FormData, UploadedFile};
pub use error_list::{ErrorContainer, ErrorDict, ErrorList, NON_FIELD_ERRORS};
pub use fields::{FormFieldDef, FormFieldType};
pub use form::{BaseForm, Form, FormOptions, Saveable};
pub use formset::{FormSet, FormSetFactory, FormSetOptions};
pub use model::{Model, Record};
pub use model_form::ModelForm;
pub use state::{statevalidator_factory, DataSource, StateErrors, StateValidator, StateValidatorSet};
pub use state_form::StateValidatedForm;
pub use value::Value;
