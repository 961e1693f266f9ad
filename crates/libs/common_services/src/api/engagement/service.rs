use crate::api::engagement::error::log_error;
use crate::api::engagement::{EngagementError, LikeOutcome, UnlikeOutcome};
use crate::document_store::{
    Counter, Document, DocumentRef, DocumentStore, FieldValue, FieldWrites, Query, StoreError,
    Subscription, WriteBatch, fields,
};
use crate::utils::nice_id;
use app_state::EngagementConstants;
use common_types::{Comment, Like, MediaStats};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const LIKES: &str = "likes";
pub const COMMENTS: &str = "comments";
pub const IMPRESSIONS: &str = "impressions";
pub const MEDIA_STATS: &str = "mediaStats";

/// Likes, comments and impressions, each written together with the matching
/// `mediaStats` counter delta in one batch.
///
/// Callers are expected to have checked album access before calling in.
pub struct EngagementService<S> {
    store: S,
    document_id_length: usize,
    anonymous_user_id: String,
    default_impression_source: String,
}

fn stats_ref(media_id: &str) -> DocumentRef {
    DocumentRef::new(MEDIA_STATS, media_id)
}

/// Field writes that move one counter of a media item by `delta`.
fn counter_delta(media_id: &str, counter: &str, delta: i64) -> FieldWrites {
    fields([
        ("mediaId", FieldValue::value(media_id)),
        (counter, FieldValue::Increment(delta)),
        ("lastUpdated", FieldValue::ServerTimestamp),
    ])
}

fn require(value: &str, what: &str) -> Result<(), EngagementError> {
    if value.trim().is_empty() {
        return Err(EngagementError::InvalidInput(format!("{what} cannot be empty")));
    }
    Ok(())
}

/// Decodes every document that parses, skipping (and logging) the rest.
fn decode_all<T: DeserializeOwned>(docs: &[Document], id_field: &str) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| {
            doc.decode(id_field)
                .inspect_err(|e| warn!("Skipping undecodable document {}: {}", doc.id, e))
                .ok()
        })
        .collect()
}

fn decode_stats(media_id: &str, doc: Option<&Document>) -> Result<MediaStats, StoreError> {
    doc.map_or_else(|| Ok(MediaStats::empty(media_id)), |doc| doc.decode("mediaId"))
}

impl<S: DocumentStore> EngagementService<S> {
    pub fn new(store: S, constants: &EngagementConstants) -> Self {
        Self {
            store,
            document_id_length: constants.document_id_length,
            anonymous_user_id: constants.anonymous_user_id.clone(),
            default_impression_source: constants.default_impression_source.clone(),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    //================================================================================
    // Likes
    //================================================================================

    /// Likes the media once. A repeated like is reported as `AlreadyLiked` and
    /// leaves the counter alone.
    #[instrument(skip(self))]
    pub async fn add_like(
        &self,
        media_id: &str,
        album_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<LikeOutcome, EngagementError> {
        require(media_id, "media id")?;
        require(user_id, "user id")?;

        let like = DocumentRef::new(LIKES, Like::id_for(user_id, media_id));
        let mut batch = WriteBatch::new();
        batch
            .create(
                like.clone(),
                fields([
                    ("mediaId", FieldValue::value(media_id)),
                    ("albumId", FieldValue::value(album_id)),
                    ("userId", FieldValue::value(user_id)),
                    ("displayName", FieldValue::value(display_name)),
                    ("createdAt", FieldValue::ServerTimestamp),
                ]),
            )
            .update(stats_ref(media_id), counter_delta(media_id, "likeCount", 1));

        match self.store.commit(batch).await {
            Ok(()) => {
                info!("Liked media");
                Ok(LikeOutcome::Liked)
            }
            Err(StoreError::AlreadyExists(doc)) if doc == like => {
                self.ensure_like_of(&like, media_id, user_id).await?;
                debug!("Media was already liked");
                Ok(LikeOutcome::AlreadyLiked)
            }
            Err(e) => Err(EngagementError::from(e)).inspect_err(log_error),
        }
    }

    /// Like ids join user and media id, so two different pairs can map to the same
    /// id. An existing like only counts as ours if it was stored for this pair.
    async fn ensure_like_of(
        &self,
        like: &DocumentRef,
        media_id: &str,
        user_id: &str,
    ) -> Result<(), EngagementError> {
        let stored = self.store.get(like).await?;
        let field = |name: &str| {
            stored
                .as_ref()
                .and_then(|doc| doc.data.get(name))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };
        let same_pair = field("mediaId").as_deref() == Some(media_id)
            && field("userId").as_deref() == Some(user_id);
        if same_pair {
            return Ok(());
        }
        Err(EngagementError::InvalidInput(format!(
            "like id {} is already taken by another user and media",
            like.id
        )))
        .inspect_err(log_error)
    }

    #[instrument(skip(self))]
    pub async fn remove_like(
        &self,
        media_id: &str,
        user_id: &str,
    ) -> Result<UnlikeOutcome, EngagementError> {
        require(media_id, "media id")?;
        require(user_id, "user id")?;

        let like = DocumentRef::new(LIKES, Like::id_for(user_id, media_id));
        let mut batch = WriteBatch::new();
        batch
            .delete_existing(like)
            .update(stats_ref(media_id), counter_delta(media_id, "likeCount", -1));

        match self.store.commit(batch).await {
            Ok(()) => {
                info!("Removed like");
                Ok(UnlikeOutcome::Removed)
            }
            Err(StoreError::NotFound(doc)) if doc.collection == LIKES => {
                debug!("Media was not liked");
                Ok(UnlikeOutcome::NotFound)
            }
            Err(e) => Err(EngagementError::from(e)).inspect_err(log_error),
        }
    }

    pub async fn has_user_liked(
        &self,
        media_id: &str,
        user_id: &str,
    ) -> Result<bool, EngagementError> {
        let like = DocumentRef::new(LIKES, Like::id_for(user_id, media_id));
        Ok(self.store.get(&like).await?.is_some())
    }

    //================================================================================
    // Comments
    //================================================================================

    /// Stores the comment as typed and returns its id.
    #[instrument(skip(self, text))]
    pub async fn add_comment(
        &self,
        media_id: &str,
        album_id: &str,
        user_id: &str,
        display_name: &str,
        text: &str,
    ) -> Result<String, EngagementError> {
        require(media_id, "media id")?;
        require(user_id, "user id")?;
        require(text, "comment").inspect_err(log_error)?;

        let comment_id = nice_id(self.document_id_length);
        let mut batch = WriteBatch::new();
        batch
            .create(
                DocumentRef::new(COMMENTS, comment_id.clone()),
                fields([
                    ("mediaId", FieldValue::value(media_id)),
                    ("albumId", FieldValue::value(album_id)),
                    ("userId", FieldValue::value(user_id)),
                    ("displayName", FieldValue::value(display_name)),
                    ("text", FieldValue::value(text)),
                    ("createdAt", FieldValue::ServerTimestamp),
                ]),
            )
            .update(stats_ref(media_id), counter_delta(media_id, "commentCount", 1));
        self.store.commit(batch).await.inspect_err(|e| warn!("Could not add comment: {}", e))?;

        info!(comment_id = %comment_id, "Added comment");
        Ok(comment_id)
    }

    /// Deletes the comment and decrements the comment counter of `media_id`.
    ///
    /// Checking who is allowed to do this is up to the caller; `delete_own_comment`
    /// does it for the comment's author.
    #[instrument(skip(self))]
    pub async fn delete_comment(
        &self,
        comment_id: &str,
        media_id: &str,
    ) -> Result<(), EngagementError> {
        require(comment_id, "comment id")?;
        require(media_id, "media id")?;

        let comment = self.find_comment(comment_id).await?;
        if comment.media_id != media_id {
            return Err(EngagementError::InvalidInput(format!(
                "comment {comment_id} does not belong to media {media_id}"
            )))
            .inspect_err(log_error);
        }

        let mut batch = WriteBatch::new();
        batch
            .delete_existing(DocumentRef::new(COMMENTS, comment_id))
            .update(stats_ref(media_id), counter_delta(media_id, "commentCount", -1));

        match self.store.commit(batch).await {
            Ok(()) => {
                info!("Deleted comment");
                Ok(())
            }
            // Someone else deleted it in the meantime.
            Err(StoreError::NotFound(_)) => {
                Err(EngagementError::NotFound(format!("comment {comment_id}")))
                    .inspect_err(log_error)
            }
            Err(e) => Err(EngagementError::from(e)).inspect_err(log_error),
        }
    }

    /// Like `delete_comment`, but only for the comment's author.
    #[instrument(skip(self))]
    pub async fn delete_own_comment(
        &self,
        comment_id: &str,
        media_id: &str,
        user_id: &str,
    ) -> Result<(), EngagementError> {
        let comment = self.find_comment(comment_id).await?;
        if comment.user_id != user_id {
            return Err(EngagementError::Forbidden(
                "only the author can delete a comment".to_owned(),
            ))
            .inspect_err(log_error);
        }
        self.delete_comment(comment_id, media_id).await
    }

    async fn find_comment(&self, comment_id: &str) -> Result<Comment, EngagementError> {
        let doc = self
            .store
            .get(&DocumentRef::new(COMMENTS, comment_id))
            .await?
            .ok_or_else(|| EngagementError::NotFound(format!("comment {comment_id}")))
            .inspect_err(log_error)?;
        Ok(doc.decode("id")?)
    }

    //================================================================================
    // Impressions
    //================================================================================

    /// Records one view. Every call counts, also repeated views by the same user.
    #[instrument(skip(self))]
    pub async fn track_impression(
        &self,
        media_id: &str,
        user_id: Option<&str>,
        source: Option<&str>,
    ) -> Result<(), EngagementError> {
        require(media_id, "media id")?;
        let user_id = user_id.unwrap_or(&self.anonymous_user_id);
        let source = source.unwrap_or(&self.default_impression_source);

        let mut batch = WriteBatch::new();
        batch
            .create(
                DocumentRef::new(IMPRESSIONS, nice_id(self.document_id_length)),
                fields([
                    ("mediaId", FieldValue::value(media_id)),
                    ("userId", FieldValue::value(user_id)),
                    ("source", FieldValue::value(source)),
                    ("timestamp", FieldValue::ServerTimestamp),
                ]),
            )
            .update(stats_ref(media_id), counter_delta(media_id, "viewCount", 1));
        self.store
            .commit(batch)
            .await
            .map_err(EngagementError::from)
            .inspect_err(log_error)
    }

    //================================================================================
    // Stats
    //================================================================================

    /// Current counters of a media item. All zero if nothing happened to it yet.
    pub async fn get_media_stats(&self, media_id: &str) -> Result<MediaStats, EngagementError> {
        let doc = self.store.get(&stats_ref(media_id)).await?;
        Ok(decode_stats(media_id, doc.as_ref())?)
    }

    /// Fetches stats one id at a time, in input order. Duplicate ids are fetched
    /// and returned again.
    #[instrument(skip(self, media_ids), fields(count = media_ids.len()))]
    pub async fn get_multiple_media_stats(
        &self,
        media_ids: &[String],
    ) -> Result<Vec<MediaStats>, EngagementError> {
        let mut stats = Vec::with_capacity(media_ids.len());
        for media_id in media_ids {
            stats.push(self.get_media_stats(media_id).await?);
        }
        Ok(stats)
    }

    /// Rebuilds the counters of a media item by counting its likes, comments and
    /// impressions. Events committed while this runs are never lost.
    #[instrument(skip(self))]
    pub async fn recount_media_stats(
        &self,
        media_id: &str,
    ) -> Result<MediaStats, EngagementError> {
        require(media_id, "media id")?;

        let counter = |field: &str, collection: &str| {
            Counter::new(field, Query::collection(collection).where_eq("mediaId", media_id))
        };
        let recount = self
            .store
            .recount(
                stats_ref(media_id),
                &[
                    counter("likeCount", LIKES),
                    counter("commentCount", COMMENTS),
                    counter("viewCount", IMPRESSIONS),
                ],
                fields([
                    ("mediaId", FieldValue::value(media_id)),
                    ("lastUpdated", FieldValue::ServerTimestamp),
                ]),
            )
            .await
            .inspect_err(|e| warn!("Could not recount stats of {}: {}", media_id, e))?;

        let before = decode_stats(media_id, recount.before.as_ref())?;
        let after = decode_stats(media_id, Some(&recount.after))?;
        if (before.like_count, before.comment_count, before.view_count)
            != (after.like_count, after.comment_count, after.view_count)
        {
            warn!(
                "Corrected stats of {}: likes {} -> {}, comments {} -> {}, views {} -> {}",
                media_id,
                before.like_count,
                after.like_count,
                before.comment_count,
                after.comment_count,
                before.view_count,
                after.view_count
            );
        }
        Ok(after)
    }

    /// Recounts every media item that has stats or any engagement.
    #[instrument(skip(self))]
    pub async fn reconcile_all_stats(&self) -> Result<Vec<MediaStats>, EngagementError> {
        let mut media_ids = BTreeSet::new();
        for collection in [LIKES, COMMENTS, IMPRESSIONS] {
            for doc in self.store.query(&Query::collection(collection)).await? {
                if let Some(media_id) = doc.data.get("mediaId").and_then(serde_json::Value::as_str) {
                    media_ids.insert(media_id.to_owned());
                }
            }
        }
        for doc in self.store.query(&Query::collection(MEDIA_STATS)).await? {
            media_ids.insert(doc.id);
        }

        let mut reconciled = Vec::with_capacity(media_ids.len());
        for media_id in &media_ids {
            reconciled.push(self.recount_media_stats(media_id).await?);
        }
        info!("Reconciled stats of {} media items", reconciled.len());
        Ok(reconciled)
    }

    //================================================================================
    // Live subscriptions
    //================================================================================

    /// Calls `callback` with all likes of the media, oldest first, now and after
    /// every change. Drop the subscription to stop.
    #[instrument(skip(self, callback))]
    pub async fn subscribe_likes(
        &self,
        media_id: &str,
        callback: impl Fn(Vec<Like>) + Send + Sync + 'static,
    ) -> Result<Subscription, EngagementError> {
        let query = Query::collection(LIKES)
            .where_eq("mediaId", media_id)
            .order_by_asc("createdAt");
        let subscription = self
            .store
            .listen_query(
                query,
                Arc::new(move |docs: Vec<Document>| callback(decode_all(&docs, "id"))),
            )
            .await?;
        debug!("Subscribed to likes");
        Ok(subscription)
    }

    /// Calls `callback` with all comments of the media, oldest first, now and
    /// after every change. Drop the subscription to stop.
    #[instrument(skip(self, callback))]
    pub async fn subscribe_comments(
        &self,
        media_id: &str,
        callback: impl Fn(Vec<Comment>) + Send + Sync + 'static,
    ) -> Result<Subscription, EngagementError> {
        let query = Query::collection(COMMENTS)
            .where_eq("mediaId", media_id)
            .order_by_asc("createdAt");
        let subscription = self
            .store
            .listen_query(
                query,
                Arc::new(move |docs: Vec<Document>| callback(decode_all(&docs, "id"))),
            )
            .await?;
        debug!("Subscribed to comments");
        Ok(subscription)
    }

    /// Calls `callback` with the counters of the media, now and after every change.
    /// Drop the subscription to stop.
    #[instrument(skip(self, callback))]
    pub async fn subscribe_media_stats(
        &self,
        media_id: &str,
        callback: impl Fn(MediaStats) + Send + Sync + 'static,
    ) -> Result<Subscription, EngagementError> {
        let owned_id = media_id.to_owned();
        let subscription = self
            .store
            .listen_document(
                stats_ref(media_id),
                Arc::new(move |doc: Option<Document>| {
                    match decode_stats(&owned_id, doc.as_ref()) {
                        Ok(stats) => callback(stats),
                        Err(e) => warn!("Skipping undecodable stats of {}: {}", owned_id, e),
                    }
                }),
            )
            .await?;
        debug!("Subscribed to media stats");
        Ok(subscription)
    }
}
