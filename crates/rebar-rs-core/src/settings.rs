//! Settings for rebar-rs.
//!
//! This module provides the [`Settings`] struct, which holds the defaults used
//! when constructing forms, formsets, and groups, and [`LazySettings`], a
//! globally-accessible, lazily-initialized settings instance.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// The complete set of rebar-rs settings.
///
/// # Examples
///
/// ```
/// use rebar_rs_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.default_group_prefix, "group");
/// assert_eq!(settings.auto_id, "id_%s");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled.
    pub debug: bool,

    // ── Forms ────────────────────────────────────────────────────────

    /// Prefix used by a form group when none is given at construction.
    pub default_group_prefix: String,
    /// Template for HTML ids; `%s` is replaced by the prefixed field name.
    pub auto_id: String,
    /// Suffix appended to field labels.
    pub label_suffix: String,
    /// Number of extra (blank) forms a formset factory adds by default.
    pub formset_extra: usize,
    /// Upper bound on the number of forms a formset accepts.
    pub formset_max_num: usize,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            default_group_prefix: "group".to_string(),
            auto_id: "id_%s".to_string(),
            label_suffix: ":".to_string(),
            formset_extra: 1,
            formset_max_num: 1000,
            log_level: "info".to_string(),
            extra: HashMap::new(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup. Library code
/// reads settings through [`current`](LazySettings::current) and falls back to
/// [`Settings::default`] when nothing was configured.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns a reference to the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if settings have not been configured.
    pub fn get(&self) -> &Settings {
        self.inner
            .get()
            .expect("Settings have not been configured. Call SETTINGS.configure() first.")
    }

    /// Returns the configured settings, or `None` if none were configured.
    pub fn current(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns a copy of the configured settings, or the defaults.
    pub fn current_or_default(&self) -> Settings {
        self.current().cloned().unwrap_or_default()
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();
