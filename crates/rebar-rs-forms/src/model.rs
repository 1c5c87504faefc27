//! Backing records for model forms.
//!
//! [`Model`] is the persistence seam: anything a form can save onto. It is
//! object safe so forms and groups can hold `&mut dyn Model`. [`Record`] is an
//! in-memory implementation with process-wide id assignment, used wherever a
//! real storage layer is not wired in.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use rebar_rs_core::{RebarError, RebarResult};

use crate::value::Value;

/// Next primary key handed out by [`Record::save`].
static NEXT_ID: AtomicI64 = AtomicI64::new(1);

/// A persistable record.
pub trait Model: Send + Sync + fmt::Debug + 'static {
    /// Returns the model name, e.g. `"person"`.
    fn model_name(&self) -> &str;

    /// Returns the primary key, or `None` if the record was never saved.
    fn pk(&self) -> Option<&Value>;

    /// Returns the value of `name`, if the record has such a field.
    fn field_value(&self, name: &str) -> Option<Value>;

    /// Sets the value of `name`.
    fn set_field_value(&mut self, name: &str, value: Value) -> RebarResult<()>;

    /// Persists the record, assigning a primary key if it has none.
    fn save(&mut self) -> RebarResult<()>;

    /// Replaces the values of a many-valued relation.
    ///
    /// Fails with [`RebarError::NotSaved`] if the record has no primary key.
    fn set_related(&mut self, relation: &str, values: Vec<Value>) -> RebarResult<()>;

    /// Replaces the child rows of `relation`, pointing each at this record
    /// through `fk_name`.
    ///
    /// Fails with [`RebarError::NotSaved`] if the record has no primary key.
    fn add_children(
        &mut self,
        relation: &str,
        fk_name: &str,
        rows: Vec<HashMap<String, Value>>,
    ) -> RebarResult<()>;

    /// Upcast for typed access through `dyn Model`.
    fn as_any(&self) -> &dyn Any;
}

/// An in-memory [`Model`].
///
/// # Examples
///
/// ```
/// use rebar_rs_forms::model::{Model, Record};
/// use rebar_rs_forms::value::Value;
///
/// let mut person = Record::new("person").with_field("first_name", "Ada");
/// assert!(person.pk().is_none());
/// person.save().unwrap();
/// assert!(person.pk().is_some());
/// assert_eq!(person.field_value("first_name"), Some(Value::from("Ada")));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    model_name: String,
    id: Option<Value>,
    fields: BTreeMap<String, Value>,
    related: BTreeMap<String, Vec<Value>>,
    children: BTreeMap<String, Vec<Record>>,
    save_count: usize,
}

impl Record {
    /// Creates an unsaved record with no fields.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            id: None,
            fields: BTreeMap::new(),
            related: BTreeMap::new(),
            children: BTreeMap::new(),
            save_count: 0,
        }
    }

    /// Sets a field value.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns every field in name order.
    pub const fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Returns the values of a many-valued relation.
    pub fn related(&self, relation: &str) -> Option<&[Value]> {
        self.related.get(relation).map(Vec::as_slice)
    }

    /// Returns the child records of `relation`.
    pub fn children(&self, relation: &str) -> &[Record] {
        self.children.get(relation).map_or(&[], Vec::as_slice)
    }

    /// Returns how many times the record was saved.
    pub const fn save_count(&self) -> usize {
        self.save_count
    }

    fn require_pk(&self, relation: &str) -> RebarResult<()> {
        if self.id.is_none() {
            return Err(RebarError::NotSaved(format!("{}.{relation}", self.model_name)));
        }
        Ok(())
    }
}

impl Model for Record {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn pk(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    fn field_value(&self, name: &str) -> Option<Value> {
        if name == "id" || name == "pk" {
            return self.id.clone();
        }
        self.fields.get(name).cloned()
    }

    fn set_field_value(&mut self, name: &str, value: Value) -> RebarResult<()> {
        if name == "id" || name == "pk" {
            self.id = if value.is_empty_value() { None } else { Some(value) };
            return Ok(());
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    fn save(&mut self) -> RebarResult<()> {
        if self.id.is_none() {
            self.id = Some(Value::Int(NEXT_ID.fetch_add(1, Ordering::Relaxed)));
        }
        self.save_count += 1;
        tracing::trace!(model = %self.model_name, pk = ?self.id, "record saved");
        Ok(())
    }

    fn set_related(&mut self, relation: &str, values: Vec<Value>) -> RebarResult<()> {
        self.require_pk(relation)?;
        self.related.insert(relation.to_string(), values);
        Ok(())
    }

    fn add_children(
        &mut self,
        relation: &str,
        fk_name: &str,
        rows: Vec<HashMap<String, Value>>,
    ) -> RebarResult<()> {
        self.require_pk(relation)?;
        let parent = self.id.clone().unwrap_or(Value::Null);
        let mut children = Vec::with_capacity(rows.len());
        for row in rows {
            let mut child = Record::new(relation);
            for (name, value) in row {
                child.set_field_value(&name, value)?;
            }
            child.set_field_value(fk_name, parent.clone())?;
            child.save()?;
            children.push(child);
        }
        self.children.insert(relation.to_string(), children);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
