//! # rebar-rs-test
//!
//! Testing helpers for forms, formsets and form groups.
//!
//! - [`flatten`] - Turn a form-like object back into the data a browser
//!   would submit for it, and build data for new formset rows.

pub mod flatten;

pub use flatten::{empty_form_data, flatten_to_dict, Flatten};
