use crate::document_store::{
    Counter, Document, DocumentCallback, DocumentData, DocumentRef, DocumentStore, FieldValue,
    FieldWrites, Query, QueryCallback, Recount, StoreError, Subscription, WriteBatch, WriteOp,
    apply_fields, timestamp_value,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Channel the `documents` trigger publishes to.
pub const DOCUMENT_CHANGES_CHANNEL: &str = "document_changes";

/// Payload of a `document_changes` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentChange {
    pub collection: String,
    pub id: String,
}

/// `DocumentStore` on top of the `documents` table.
///
/// A single `PgListener` per store forwards change notifications into a broadcast
/// channel. Each live listener re-reads its document or query when something in
/// its collection changed, and only calls back when the result differs.
///
/// The `PgListener` task stops when the last clone of the store is dropped.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    changes: broadcast::Sender<Arc<DocumentChange>>,
    _listener: Arc<ListenerTask>,
}

struct ListenerTask(JoinHandle<()>);

impl Drop for ListenerTask {
    fn drop(&mut self) {
        debug!("Stopping document change listener");
        self.0.abort();
    }
}

impl PgDocumentStore {
    pub async fn connect(pool: PgPool, broadcast_capacity: usize) -> Result<Self, StoreError> {
        let (tx, _) = broadcast::channel(broadcast_capacity);

        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(DOCUMENT_CHANGES_CHANNEL).await?;

        let listener_tx = tx.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<DocumentChange>(notification.payload()) {
                            Ok(change) => {
                                // No receivers just means nobody is listening right now.
                                let _ = listener_tx.send(Arc::new(change));
                            }
                            Err(e) => warn!("Ignoring malformed document change: {}", e),
                        }
                    }
                    Err(e) => {
                        error!("PgListener error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            pool,
            changes: tx,
            _listener: Arc::new(ListenerTask(task)),
        })
    }

    /// Receiver for every change notification of this store.
    #[must_use]
    pub fn changes(&self) -> broadcast::Receiver<Arc<DocumentChange>> {
        self.changes.subscribe()
    }

    async fn insert_new(
        tx: &mut Transaction<'_, Postgres>,
        doc: &DocumentRef,
        data: DocumentData,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            ",
        )
        .bind(&doc.collection)
        .bind(&doc.id)
        .bind(Json(Value::Object(data)))
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace(
        tx: &mut Transaction<'_, Postgres>,
        doc: &DocumentRef,
        data: DocumentData,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE
                SET data = EXCLUDED.data, updated_at = now()
            ",
        )
        .bind(&doc.collection)
        .bind(&doc.id)
        .bind(Json(Value::Object(data)))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Plain values are merged in one statement. Increments run as SQL arithmetic on
    /// the locked row, so concurrent commits never lose an update.
    async fn merge(
        tx: &mut Transaction<'_, Postgres>,
        doc: &DocumentRef,
        fields: &FieldWrites,
        now: &Value,
    ) -> Result<(), StoreError> {
        let mut plain = DocumentData::new();
        let mut increments = Vec::new();
        for (field, write) in fields {
            match write {
                FieldValue::Value(value) => {
                    plain.insert(field.clone(), value.clone());
                }
                FieldValue::ServerTimestamp => {
                    plain.insert(field.clone(), now.clone());
                }
                FieldValue::Increment(delta) => increments.push((field, *delta)),
            }
        }

        sqlx::query(
            r"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE
                SET data = documents.data || EXCLUDED.data, updated_at = now()
            ",
        )
        .bind(&doc.collection)
        .bind(&doc.id)
        .bind(Json(Value::Object(plain)))
        .execute(&mut **tx)
        .await?;

        for (field, delta) in increments {
            sqlx::query(
                r"
                UPDATE documents
                SET data = jsonb_set(
                        data,
                        ARRAY[$3::text],
                        to_jsonb(COALESCE((data ->> $3::text)::bigint, 0) + $4::bigint),
                        true
                    ),
                    updated_at = now()
                WHERE collection = $1 AND id = $2
                ",
            )
            .bind(&doc.collection)
            .bind(&doc.id)
            .bind(field)
            .bind(delta)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn fetch_locked(
        tx: &mut Transaction<'_, Postgres>,
        doc: &DocumentRef,
    ) -> Result<Document, StoreError> {
        let row = sqlx::query_as::<_, (String, Json<Value>)>(
            "SELECT id, data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(&doc.collection)
        .bind(&doc.id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(into_document(row))
    }
}

/// The equality filters of a query as a JSONB containment pattern.
fn containment(query: &Query) -> Json<Value> {
    Json(Value::Object(query.filters().iter().cloned().collect()))
}

fn into_document((id, Json(data)): (String, Json<Value>)) -> Document {
    let data = match data {
        Value::Object(map) => map,
        _ => DocumentData::new(),
    };
    Document { id, data }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, (String, Json<Value>)>(
            "SELECT id, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(&doc.collection)
        .bind(&doc.id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(into_document))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, (String, Json<Value>)>(
            r"
            SELECT id, data
            FROM documents
            WHERE collection = $1 AND data @> $2
            ORDER BY data -> $3::text NULLS FIRST, id
            ",
        )
        .bind(query.collection_name())
        .bind(containment(query))
        .bind(query.order_field())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(into_document).collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let writes = batch.len();
        let now = timestamp_value(Utc::now());
        let mut tx = self.pool.begin().await?;

        // Returning early drops `tx`, which rolls the whole batch back.
        for op in batch.into_ops() {
            match op {
                WriteOp::Create { doc, fields } => {
                    let data = apply_fields(None, &fields, &now);
                    if !Self::insert_new(&mut tx, &doc, data).await? {
                        return Err(StoreError::AlreadyExists(doc));
                    }
                }
                WriteOp::Set { doc, fields } => {
                    Self::replace(&mut tx, &doc, apply_fields(None, &fields, &now)).await?;
                }
                WriteOp::Update { doc, fields } => {
                    Self::merge(&mut tx, &doc, &fields, &now).await?;
                }
                WriteOp::Delete { doc, must_exist } => {
                    let result =
                        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                            .bind(&doc.collection)
                            .bind(&doc.id)
                            .execute(&mut *tx)
                            .await?;
                    if must_exist && result.rows_affected() == 0 {
                        return Err(StoreError::NotFound(doc));
                    }
                }
            }
        }

        tx.commit().await?;
        debug!("Committed {} document writes", writes);
        Ok(())
    }

    async fn recount(
        &self,
        doc: DocumentRef,
        counters: &[Counter],
        fields: FieldWrites,
    ) -> Result<Recount, StoreError> {
        let now = timestamp_value(Utc::now());
        let mut tx = self.pool.begin().await?;

        // Lock the counter row before counting. Batches write their event documents
        // before the counter, so any batch the counts below cannot see yet is still
        // waiting on this row and applies its delta on top of the recount.
        let created = Self::insert_new(&mut tx, &doc, DocumentData::new()).await?;
        let locked = Self::fetch_locked(&mut tx, &doc).await?;
        let before = (!created).then_some(locked);

        let mut writes = fields;
        for counter in counters {
            let count: i64 = sqlx::query_scalar(
                "SELECT count(*) FROM documents WHERE collection = $1 AND data @> $2",
            )
            .bind(counter.query.collection_name())
            .bind(containment(&counter.query))
            .fetch_one(&mut *tx)
            .await?;
            writes.insert(counter.field.clone(), FieldValue::value(count));
        }
        Self::merge(&mut tx, &doc, &writes, &now).await?;
        let after = Self::fetch_locked(&mut tx, &doc).await?;

        tx.commit().await?;
        debug!("Recounted {} counters of {}", counters.len(), doc);
        Ok(Recount { before, after })
    }

    async fn listen_document(
        &self,
        doc: DocumentRef,
        callback: DocumentCallback,
    ) -> Result<Subscription, StoreError> {
        // Subscribe before the first read so no change slips in between.
        let mut changes = self.changes.subscribe();
        let initial = self.get(&doc).await?;
        callback(initial.clone());

        let store = self.clone();
        let task = tokio::spawn(async move {
            let mut last = initial;
            loop {
                match changes.recv().await {
                    Ok(change) if change.collection != doc.collection || change.id != doc.id => {}
                    Ok(_) | Err(RecvError::Lagged(_)) => match store.get(&doc).await {
                        Ok(current) if current != last => {
                            callback(current.clone());
                            last = current;
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Could not refresh document {}: {}", doc, e),
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(move || task.abort()))
    }

    async fn listen_query(
        &self,
        query: Query,
        callback: QueryCallback,
    ) -> Result<Subscription, StoreError> {
        let mut changes = self.changes.subscribe();
        let initial = self.query(&query).await?;
        callback(initial.clone());

        let store = self.clone();
        let task = tokio::spawn(async move {
            let mut last = initial;
            loop {
                match changes.recv().await {
                    Ok(change) if change.collection != query.collection_name() => {}
                    Ok(_) | Err(RecvError::Lagged(_)) => match store.query(&query).await {
                        Ok(current) if current != last => {
                            callback(current.clone());
                            last = current;
                        }
                        Ok(_) => {}
                        Err(e) => warn!(
                            "Could not refresh query on {}: {}",
                            query.collection_name(),
                            e
                        ),
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(move || task.abort()))
    }
}
