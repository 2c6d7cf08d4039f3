//! Field-level partial updates with merge semantics.

use serde_json::{Map, Value};

/// One field operation. Fields not named in a [`Patch`] are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    /// Add each element not already present; a missing field becomes an array.
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each element.
    ArrayRemove(Vec<Value>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    updates: Vec<(String, FieldUpdate)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates.push((field.into(), FieldUpdate::Set(value.into())));
        self
    }

    pub fn array_union(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates
            .push((field.into(), FieldUpdate::ArrayUnion(vec![value.into()])));
        self
    }

    pub fn array_remove(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates
            .push((field.into(), FieldUpdate::ArrayRemove(vec![value.into()])));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Apply in order. Returns whether any field value actually changed.
    pub fn apply(&self, fields: &mut Map<String, Value>) -> bool {
        let mut changed = false;

        for (field, update) in &self.updates {
            let before = fields.get(field).cloned();

            match update {
                FieldUpdate::Set(value) => {
                    fields.insert(field.clone(), value.clone());
                }
                FieldUpdate::ArrayUnion(elements) => {
                    let mut array = take_array(fields, field);
                    for element in elements {
                        if !array.contains(element) {
                            array.push(element.clone());
                        }
                    }
                    fields.insert(field.clone(), Value::Array(array));
                }
                FieldUpdate::ArrayRemove(elements) => {
                    let mut array = take_array(fields, field);
                    array.retain(|existing| !elements.contains(existing));
                    fields.insert(field.clone(), Value::Array(array));
                }
            }

            changed |= fields.get(field) != before.as_ref();
        }

        changed
    }
}

/// The array stored under `field`. Missing or non-array values start empty.
fn take_array(fields: &mut Map<String, Value>, field: &str) -> Vec<Value> {
    match fields.remove(field) {
        Some(Value::Array(array)) => array,
        _ => Vec::new(),
    }
}
