//! # rebar-rs-core
//!
//! Core types shared by every rebar-rs crate. This crate has no framework
//! dependencies and provides the foundation the forms and group crates build on.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Framework settings and global configuration
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{RebarError, RebarResult, ValidationError};
pub use settings::{Settings, SETTINGS};
