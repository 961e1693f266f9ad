use crate::document_store::{Document, DocumentData};
use serde_json::Value;
use std::cmp::Ordering;

/// Equality filters on one collection, optionally ordered ascending by a field.
/// Documents with equal sort keys are ordered by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<(String, Value)>,
    order_by: Option<String>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn order_by_asc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    #[must_use]
    pub fn order_field(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    #[must_use]
    pub fn matches(&self, data: &DocumentData) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| data.get(field) == Some(expected))
    }

    pub(crate) fn sort(&self, docs: &mut [Document]) {
        match &self.order_by {
            Some(field) => docs.sort_by(|a, b| {
                compare_values(a.data.get(field), b.data.get(field)).then_with(|| a.id.cmp(&b.id))
            }),
            None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}
