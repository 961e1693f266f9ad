use crate::document_store::{DocumentData, DocumentRef};
use serde_json::Value;
use std::collections::BTreeMap;

/// What to write into a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    /// Adds to the stored integer, treating a missing field as 0.
    Increment(i64),
    /// The commit time of the batch, as assigned by the store.
    ServerTimestamp,
}

impl FieldValue {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

pub type FieldWrites = BTreeMap<String, FieldValue>;

/// Builds a `FieldWrites` map from `(field, value)` pairs.
pub fn fields<const N: usize>(entries: [(&str, FieldValue); N]) -> FieldWrites {
    entries
        .into_iter()
        .map(|(field, value)| (field.to_owned(), value))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Fails the batch if the document already exists.
    Create { doc: DocumentRef, fields: FieldWrites },
    /// Replaces the whole document.
    Set { doc: DocumentRef, fields: FieldWrites },
    /// Merges into the document, creating it if needed.
    Update { doc: DocumentRef, fields: FieldWrites },
    /// With `must_exist`, fails the batch if the document is missing.
    Delete { doc: DocumentRef, must_exist: bool },
}

impl WriteOp {
    #[must_use]
    pub const fn doc(&self) -> &DocumentRef {
        match self {
            Self::Create { doc, .. }
            | Self::Set { doc, .. }
            | Self::Update { doc, .. }
            | Self::Delete { doc, .. } => doc,
        }
    }
}

/// Writes that are committed together, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, doc: DocumentRef, fields: FieldWrites) -> &mut Self {
        self.ops.push(WriteOp::Create { doc, fields });
        self
    }

    pub fn set(&mut self, doc: DocumentRef, fields: FieldWrites) -> &mut Self {
        self.ops.push(WriteOp::Set { doc, fields });
        self
    }

    pub fn update(&mut self, doc: DocumentRef, fields: FieldWrites) -> &mut Self {
        self.ops.push(WriteOp::Update { doc, fields });
        self
    }

    pub fn delete(&mut self, doc: DocumentRef) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            doc,
            must_exist: false,
        });
        self
    }

    pub fn delete_existing(&mut self, doc: DocumentRef) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            doc,
            must_exist: true,
        });
        self
    }

    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Resolves field writes on top of `base`. `now` is the value used for server timestamps.
pub(crate) fn apply_fields(
    base: Option<&DocumentData>,
    fields: &FieldWrites,
    now: &Value,
) -> DocumentData {
    let mut data = base.cloned().unwrap_or_default();
    for (field, write) in fields {
        let value = match write {
            FieldValue::Value(value) => value.clone(),
            FieldValue::ServerTimestamp => now.clone(),
            FieldValue::Increment(delta) => {
                let current = data.get(field).and_then(Value::as_i64).unwrap_or(0);
                Value::from(current.saturating_add(*delta))
            }
        };
        data.insert(field.clone(), value);
    }
    data
}
