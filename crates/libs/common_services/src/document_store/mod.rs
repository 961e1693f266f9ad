//! A small document database abstraction: named collections of JSON documents,
//! all-or-nothing write batches with atomic counter increments, equality queries
//! and live listeners.

mod batch;
mod error;
mod memory;
mod postgres;
mod query;
mod subscription;

pub use batch::*;
pub use error::*;
pub use memory::*;
pub use postgres::*;
pub use query::*;
pub use subscription::*;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// The fields of a stored document. The id is kept outside of the data.
pub type DocumentData = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: DocumentData,
}

impl Document {
    /// Deserializes the document, exposing its id as the field `id_field`.
    pub fn decode<T: DeserializeOwned>(&self, id_field: &str) -> Result<T, StoreError> {
        let mut data = self.data.clone();
        data.insert(id_field.to_owned(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}

/// Receives the current version of a single document, or `None` once it is gone.
pub type DocumentCallback = Arc<dyn Fn(Option<Document>) + Send + Sync>;

/// Receives the full, ordered result set of a query.
pub type QueryCallback = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

/// A counter field that `DocumentStore::recount` sets to the number of documents
/// matching `query`.
#[derive(Debug, Clone)]
pub struct Counter {
    pub field: String,
    pub query: Query,
}

impl Counter {
    pub fn new(field: impl Into<String>, query: Query) -> Self {
        Self {
            field: field.into(),
            query,
        }
    }
}

/// A document as it was before and after a recount.
#[derive(Debug, Clone, PartialEq)]
pub struct Recount {
    pub before: Option<Document>,
    pub after: Document,
}

/// Timestamps are stored as fixed-width RFC 3339 strings, so that they sort
/// chronologically as plain strings.
#[must_use]
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Applies every operation of the batch, or none of them.
    ///
    /// A failed precondition (`create` on an existing document, `delete_existing` on a
    /// missing one) rejects the whole batch with `AlreadyExists` / `NotFound`.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Counts the documents of every counter query and merges the counts into `doc`
    /// together with `fields`, creating it if needed.
    ///
    /// Counting and writing are one step: a batch committed concurrently is either
    /// part of the counts or applied on top of the written counters, never lost.
    async fn recount(
        &self,
        doc: DocumentRef,
        counters: &[Counter],
        fields: FieldWrites,
    ) -> Result<Recount, StoreError>;

    /// Calls `callback` right away with the current document, then again after every
    /// committed change to it, until the returned subscription is dropped.
    async fn listen_document(
        &self,
        doc: DocumentRef,
        callback: DocumentCallback,
    ) -> Result<Subscription, StoreError>;

    /// Calls `callback` right away with the current result set, then again after every
    /// committed change to a matching document, until the returned subscription is dropped.
    async fn listen_query(
        &self,
        query: Query,
        callback: QueryCallback,
    ) -> Result<Subscription, StoreError>;
}
