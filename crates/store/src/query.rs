//! Range queries over a single collection.
//!
//! Every backend evaluates queries with [`Query::run`], so memory and SQLite
//! stores agree on filtering, ordering and cursor semantics.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Predicate over top-level document fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// `field == value`
    Eq(String, Value),
    /// `field_a == value_a OR field_b == value_b OR ...`
    AnyOf(Vec<(String, Value)>),
}

impl Filter {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::Eq(field, value) => document.get(field) == Some(value),
            Filter::AnyOf(alternatives) => alternatives
                .iter()
                .any(|(field, value)| document.get(field) == Some(value)),
        }
    }
}

/// Position of a document in an ordered result: order-by value plus id tie-break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub value: Value,
    pub id: String,
}

impl Cursor {
    pub fn new(value: Value, id: impl Into<String>) -> Self {
        Self {
            value,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub start_after: Option<Cursor>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }

    pub fn where_any<F, V>(self, alternatives: impl IntoIterator<Item = (F, V)>) -> Self
    where
        F: Into<String>,
        V: Into<Value>,
    {
        let alternatives = alternatives
            .into_iter()
            .map(|(field, value)| (field.into(), value.into()))
            .collect();
        self.filter(Filter::AnyOf(alternatives))
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        if !self.filters.iter().all(|filter| filter.matches(document)) {
            return false;
        }
        match &self.order_by {
            // Documents without the order-by field never appear in ordered results.
            Some(order) => document.get(&order.field).is_some(),
            None => true,
        }
    }

    /// Filter, order, cursor and limit a collection's documents.
    pub fn run(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|document| self.matches(document))
            .collect();

        matched.sort_by(|a, b| self.compare(a, b));

        if let Some(cursor) = &self.start_after {
            matched.retain(|document| self.compare_to_cursor(document, cursor) == Ordering::Greater);
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        matched
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        match &self.order_by {
            Some(order) => {
                let ordering = compare_values(
                    a.get(&order.field).unwrap_or(&Value::Null),
                    b.get(&order.field).unwrap_or(&Value::Null),
                )
                .then_with(|| a.id.cmp(&b.id));
                directed(ordering, order.direction)
            }
            None => a.id.cmp(&b.id),
        }
    }

    fn compare_to_cursor(&self, document: &Document, cursor: &Cursor) -> Ordering {
        match &self.order_by {
            Some(order) => {
                let ordering = compare_values(
                    document.get(&order.field).unwrap_or(&Value::Null),
                    &cursor.value,
                )
                .then_with(|| document.id.as_str().cmp(cursor.id.as_str()));
                directed(ordering, order.direction)
            }
            None => document.id.as_str().cmp(cursor.id.as_str()),
        }
    }
}

fn directed(ordering: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Ascending => ordering,
        Direction::Descending => ordering.reverse(),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => {
                let a = a.as_f64().unwrap_or(f64::NAN);
                let b = b.as_f64().unwrap_or(f64::NAN);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| compare_values(x, y))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
