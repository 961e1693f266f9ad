use crate::document_store::{
    Counter, Document, DocumentCallback, DocumentData, DocumentRef, DocumentStore, FieldValue,
    FieldWrites, Query, QueryCallback, Recount, StoreError, Subscription, WriteBatch, WriteOp,
    apply_fields, timestamp_value,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct Collections {
    docs: BTreeMap<String, BTreeMap<String, DocumentData>>,
    last_timestamp: Option<DateTime<Utc>>,
}

struct Change {
    doc: DocumentRef,
    before: Option<DocumentData>,
    after: Option<DocumentData>,
}

#[derive(Clone)]
enum Listener {
    Document(DocumentRef, DocumentCallback),
    Query(Query, QueryCallback),
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    active: BTreeMap<u64, Listener>,
}

#[derive(Default)]
struct Inner {
    collections: Mutex<Collections>,
    listeners: Mutex<Listeners>,
}

/// In-process `DocumentStore`. Batches are applied under a single lock, and
/// listeners are called on the committing task once the lock is released.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Collections {
    fn get(&self, doc: &DocumentRef) -> Option<&DocumentData> {
        self.docs.get(&doc.collection)?.get(&doc.id)
    }

    fn query(&self, query: &Query) -> Vec<Document> {
        let mut found: Vec<Document> = self
            .docs
            .get(query.collection_name())
            .into_iter()
            .flatten()
            .filter(|(_, data)| query.matches(data))
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();
        query.sort(&mut found);
        found
    }

    /// Microsecond precision, strictly increasing across commits.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(last) = self.last_timestamp
            && now <= last
        {
            now = last + Duration::microseconds(1);
        }
        self.last_timestamp = Some(now);
        now
    }

    fn apply(&mut self, batch: &WriteBatch) -> Result<Vec<Change>, StoreError> {
        let now = timestamp_value(self.next_timestamp());

        // Resolve every write against the staged state first, so a failing
        // precondition leaves the collections untouched.
        let mut staged: BTreeMap<DocumentRef, Option<DocumentData>> = BTreeMap::new();
        for op in batch.ops() {
            let current = match staged.get(op.doc()) {
                Some(staged) => staged.clone(),
                None => self.get(op.doc()).cloned(),
            };
            let next = match op {
                WriteOp::Create { doc, fields } => {
                    if current.is_some() {
                        return Err(StoreError::AlreadyExists(doc.clone()));
                    }
                    Some(apply_fields(None, fields, &now))
                }
                WriteOp::Set { fields, .. } => Some(apply_fields(None, fields, &now)),
                WriteOp::Update { fields, .. } => {
                    Some(apply_fields(current.as_ref(), fields, &now))
                }
                WriteOp::Delete { doc, must_exist } => {
                    if *must_exist && current.is_none() {
                        return Err(StoreError::NotFound(doc.clone()));
                    }
                    None
                }
            };
            staged.insert(op.doc().clone(), next);
        }

        let mut changes = Vec::with_capacity(staged.len());
        for (doc, after) in staged {
            let collection = self.docs.entry(doc.collection.clone()).or_default();
            let before = match &after {
                Some(data) => collection.insert(doc.id.clone(), data.clone()),
                None => collection.remove(&doc.id),
            };
            changes.push(Change { doc, before, after });
        }
        Ok(changes)
    }
}

impl Listener {
    fn is_affected_by(&self, changes: &[Change]) -> bool {
        match self {
            Self::Document(doc, _) => changes.iter().any(|change| &change.doc == doc),
            Self::Query(query, _) => changes.iter().any(|change| {
                change.doc.collection == query.collection_name()
                    && (change.before.as_ref().is_some_and(|d| query.matches(d))
                        || change.after.as_ref().is_some_and(|d| query.matches(d)))
            }),
        }
    }
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered listeners that have not been released yet.
    #[must_use]
    pub fn active_listeners(&self) -> usize {
        lock(&self.inner.listeners).active.len()
    }

    fn register(&self, listener: Listener) -> Subscription {
        let id = {
            let mut listeners = lock(&self.inner.listeners);
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.active.insert(id, listener.clone());
            id
        };
        self.deliver(&listener);

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                lock(&inner.listeners).active.remove(&id);
            }
        })
    }

    /// Reads the current state for a listener and hands it over, without holding any lock.
    fn deliver(&self, listener: &Listener) {
        match listener {
            Listener::Document(doc, callback) => {
                let data = lock(&self.inner.collections).get(doc).cloned();
                callback(data.map(|data| Document {
                    id: doc.id.clone(),
                    data,
                }));
            }
            Listener::Query(query, callback) => {
                let docs = lock(&self.inner.collections).query(query);
                callback(docs);
            }
        }
    }

    fn notify(&self, changes: &[Change]) {
        let affected: Vec<Listener> = lock(&self.inner.listeners)
            .active
            .values()
            .filter(|listener| listener.is_affected_by(changes))
            .cloned()
            .collect();
        for listener in &affected {
            self.deliver(listener);
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        let collections = lock(&self.inner.collections);
        Ok(collections.get(doc).map(|data| Document {
            id: doc.id.clone(),
            data: data.clone(),
        }))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        Ok(lock(&self.inner.collections).query(query))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let changes = lock(&self.inner.collections).apply(&batch)?;
        debug!("Committed {} writes to {} documents", batch.len(), changes.len());
        self.notify(&changes);
        Ok(())
    }

    async fn recount(
        &self,
        doc: DocumentRef,
        counters: &[Counter],
        fields: FieldWrites,
    ) -> Result<Recount, StoreError> {
        let (before, changes) = {
            let mut collections = lock(&self.inner.collections);
            let before = collections.get(&doc).cloned();
            let mut writes = fields;
            for counter in counters {
                let count = collections.query(&counter.query).len() as i64;
                writes.insert(counter.field.clone(), FieldValue::value(count));
            }
            let mut batch = WriteBatch::new();
            batch.update(doc.clone(), writes);
            (before, collections.apply(&batch)?)
        };
        let after = changes
            .iter()
            .find(|change| change.doc == doc)
            .and_then(|change| change.after.clone())
            .unwrap_or_default();
        self.notify(&changes);

        Ok(Recount {
            before: before.map(|data| Document {
                id: doc.id.clone(),
                data,
            }),
            after: Document { id: doc.id, data: after },
        })
    }

    async fn listen_document(
        &self,
        doc: DocumentRef,
        callback: DocumentCallback,
    ) -> Result<Subscription, StoreError> {
        Ok(self.register(Listener::Document(doc, callback)))
    }

    async fn listen_query(
        &self,
        query: Query,
        callback: QueryCallback,
    ) -> Result<Subscription, StoreError> {
        Ok(self.register(Listener::Query(query, callback)))
    }
}
