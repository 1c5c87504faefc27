//! Record-backed forms.
//!
//! A [`ModelForm`] is a [`BaseForm`] whose fields map one-to-one onto fields
//! of a [`Model`]. Constructed with an instance, it takes its initial values
//! from that instance; [`Saveable::save`] copies cleaned data back.
//!
//! Saving with `commit = false` defers everything that needs the record to
//! exist already: relation fields (see [`ModelForm::with_m2m`]) wait for
//! [`Saveable::save_m2m`], and the optional related hook runs as
//! [`Saveable::save_related`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rebar_rs_core::{RebarError, RebarResult, ValidationError};

use crate::fields::FormFieldDef;
use crate::form::{BaseForm, Form, FormOptions, Saveable};
use crate::model::Model;
use crate::value::Value;

/// Hook that writes objects related to a saved instance.
pub type RelatedHook =
    Arc<dyn Fn(&mut dyn Model, &HashMap<String, Value>) -> RebarResult<()> + Send + Sync>;

/// A form that saves onto a [`Model`].
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::data::FormData;
/// use rebar_rs_forms::fields::{FormFieldDef, FormFieldType};
/// use rebar_rs_forms::form::{Form, FormOptions, Saveable};
/// use rebar_rs_forms::model::{Model, Record};
/// use rebar_rs_forms::model_form::ModelForm;
/// use rebar_rs_forms::value::Value;
///
/// let data = FormData::parse("first_name=Ada");
/// let mut record = Record::new("person");
/// let mut form = ModelForm::new(vec![FormFieldDef::new("first_name", FormFieldType::char())])
///     .with_instance(&record)
///     .with_options(&FormOptions { data: Some(&data), ..FormOptions::default() });
///
/// form.save(&mut record, true).unwrap();
/// assert_eq!(record.field_value("first_name"), Some(Value::from("Ada")));
/// assert!(record.pk().is_some());
/// ```
pub struct ModelForm {
    base: BaseForm,
    m2m_fields: Vec<String>,
    pending_m2m: Option<Vec<(String, Value)>>,
    related_hook: Option<RelatedHook>,
}

impl ModelForm {
    /// Creates an unbound model form over `fields`.
    pub fn new(fields: Vec<FormFieldDef>) -> Self {
        Self {
            base: BaseForm::new(fields),
            m2m_fields: Vec::new(),
            pending_m2m: None,
            related_hook: None,
        }
    }

    /// Marks fields as many-valued relations, saved only once the instance
    /// has a primary key.
    #[must_use]
    pub fn with_m2m<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.m2m_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Sets the hook run by [`Saveable::save_related`].
    #[must_use]
    pub fn with_related_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut dyn Model, &HashMap<String, Value>) -> RebarResult<()> + Send + Sync + 'static,
    {
        self.related_hook = Some(Arc::new(hook));
        self
    }

    /// Sets the cross-field clean hook.
    #[must_use]
    pub fn with_clean<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HashMap<String, Value>) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.base = self.base.with_clean(hook);
        self
    }

    /// Takes initial values from `instance` for every field it has.
    ///
    /// Initial values already set on the form take precedence.
    #[must_use]
    pub fn with_instance(mut self, instance: &dyn Model) -> Self {
        let names: Vec<String> = self.base.fields().iter().map(|f| f.name.clone()).collect();
        for name in names {
            if let Some(value) = instance.field_value(&name) {
                self.base.insert_initial(name, value);
            }
        }
        self
    }

    /// Applies construction options; see [`BaseForm::with_options`].
    #[must_use]
    pub fn with_options(mut self, options: &FormOptions<'_>) -> Self {
        self.base = self.base.with_options(options);
        self
    }

    /// Returns the relation field names.
    pub fn m2m_fields(&self) -> &[String] {
        &self.m2m_fields
    }

    fn is_m2m(&self, name: &str) -> bool {
        self.m2m_fields.iter().any(|f| f == name)
    }

    fn write_m2m(instance: &mut dyn Model, values: Vec<(String, Value)>) -> RebarResult<()> {
        for (relation, value) in values {
            let items = match value {
                Value::List(items) => items,
                Value::Null => Vec::new(),
                other => vec![other],
            };
            instance.set_related(&relation, items)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ModelForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelForm")
            .field("base", &self.base)
            .field("m2m_fields", &self.m2m_fields)
            .field("pending_m2m", &self.pending_m2m.is_some())
            .finish_non_exhaustive()
    }
}

impl Saveable for ModelForm {
    fn save(&mut self, instance: &mut dyn Model, commit: bool) -> RebarResult<()> {
        if !self.base.is_valid() {
            return Err(ValidationError::invalid(format!(
                "The {} could not be saved because the data didn't validate.",
                instance.model_name()
            ))
            .into());
        }

        let mut m2m = Vec::new();
        for field in self.base.fields() {
            let Some(value) = self.base.cleaned_data().get(&field.name) else {
                continue;
            };
            if self.is_m2m(&field.name) {
                m2m.push((field.name.clone(), value.clone()));
            } else {
                instance.set_field_value(&field.name, value.clone())?;
            }
        }

        if commit {
            instance.save()?;
            Self::write_m2m(instance, m2m)?;
        } else {
            self.pending_m2m = Some(m2m);
        }
        tracing::trace!(model = instance.model_name(), commit, "model form saved");
        Ok(())
    }

    fn has_save_m2m(&self) -> bool {
        self.pending_m2m.is_some()
    }

    fn save_m2m(&mut self, instance: &mut dyn Model) -> RebarResult<()> {
        let Some(values) = self.pending_m2m.take() else {
            return Ok(());
        };
        Self::write_m2m(instance, values)
    }

    fn has_save_related(&self) -> bool {
        self.related_hook.is_some()
    }

    fn save_related(&mut self, instance: &mut dyn Model) -> RebarResult<()> {
        let Some(hook) = self.related_hook.clone() else {
            return Ok(());
        };
        if instance.pk().is_none() {
            return Err(RebarError::NotSaved(format!(
                "{} related objects",
                instance.model_name()
            )));
        }
        hook(instance, self.base.cleaned_data())
    }
}

impl Form for ModelForm {
    fn base(&self) -> &BaseForm {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseForm {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_saveable(&mut self) -> Option<&mut dyn Saveable> {
        Some(self)
    }
}
