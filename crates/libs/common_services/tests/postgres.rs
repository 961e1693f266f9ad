//! Runs against the database in `APP__SECRETS__DATABASE_URL`. Every test returns early
//! when no database is configured. Ids are random, so the tests can share one database.

mod common;

use chrono::Utc;
use common::{database_constants, engagement_constants, postgres_pool, user};
use common_services::api::access::{AccessError, AccessService};
use common_services::api::engagement::{EngagementService, LIKES, LikeOutcome};
use common_services::database::{AlbumRepository, DbError, PgAlbumStore};
use common_services::document_store::{
    Document, DocumentRef, DocumentStore, FieldValue, PgDocumentStore, Query, StoreError,
    WriteBatch, fields,
};
use common_services::utils::nice_id;
use common_types::{Album, AlbumRole, NewAlbum, User};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn document_store() -> color_eyre::Result<Option<PgDocumentStore>> {
    let Some(pool) = postgres_pool().await? else {
        return Ok(None);
    };
    Ok(Some(PgDocumentStore::connect(pool, 64).await?))
}

/// A collection nobody else writes to.
fn scratch_collection(name: &str) -> String {
    format!("{name}_{}", nice_id(10))
}

//================================================================================
// Document store
//================================================================================

#[tokio::test]
async fn create_on_existing_document_rolls_back_the_batch() -> color_eyre::Result<()> {
    let Some(store) = document_store().await? else {
        return Ok(());
    };
    // ARRANGE
    let likes = scratch_collection("likes");
    let stats = DocumentRef::new(scratch_collection("stats"), "m1");
    let like = DocumentRef::new(likes, "u1_m1");
    let mut batch = WriteBatch::new();
    batch
        .create(like.clone(), fields([("userId", FieldValue::value("u1"))]))
        .update(stats.clone(), fields([("likeCount", FieldValue::Increment(1))]));
    store.commit(batch.clone()).await?;

    // ACT
    let second = store.commit(batch).await;

    // ASSERT
    assert!(matches!(second, Err(StoreError::AlreadyExists(doc)) if doc == like));
    let stats = store.get(&stats).await?.expect("stats document");
    assert_eq!(stats.data.get("likeCount"), Some(&json!(1)));
    Ok(())
}

#[tokio::test]
async fn delete_existing_on_missing_document_rolls_back_the_batch() -> color_eyre::Result<()> {
    let Some(store) = document_store().await? else {
        return Ok(());
    };
    let stats = DocumentRef::new(scratch_collection("stats"), "m1");
    let mut batch = WriteBatch::new();
    batch
        .delete_existing(DocumentRef::new(scratch_collection("comments"), "missing"))
        .update(stats.clone(), fields([("commentCount", FieldValue::Increment(-1))]));

    let result = store.commit(batch).await;

    assert!(matches!(result, Err(StoreError::NotFound(_))));
    assert!(store.get(&stats).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn concurrent_increments_are_all_applied() -> color_eyre::Result<()> {
    let Some(store) = document_store().await? else {
        return Ok(());
    };
    // ARRANGE
    let stats = DocumentRef::new(scratch_collection("stats"), "m1");

    // ACT
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let stats = stats.clone();
        tasks.push(tokio::spawn(async move {
            let mut batch = WriteBatch::new();
            batch.update(
                stats,
                fields([
                    ("viewCount", FieldValue::Increment(1)),
                    ("lastUpdated", FieldValue::ServerTimestamp),
                ]),
            );
            store.commit(batch).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    // ASSERT
    let stats = store.get(&stats).await?.expect("stats document");
    assert_eq!(stats.data.get("viewCount"), Some(&json!(20)));
    assert!(stats.data.contains_key("lastUpdated"));
    Ok(())
}

#[tokio::test]
async fn query_filters_and_orders_by_field_then_id() -> color_eyre::Result<()> {
    let Some(store) = document_store().await? else {
        return Ok(());
    };
    let comments = scratch_collection("comments");
    let mut batch = WriteBatch::new();
    let rows = [
        ("c", "m1", "2"),
        ("b", "m1", "1"),
        ("a", "m1", "2"),
        ("d", "m2", "0"),
    ];
    for (id, media, created) in rows {
        batch.create(
            DocumentRef::new(comments.clone(), id),
            fields([
                ("mediaId", FieldValue::value(media)),
                ("createdAt", FieldValue::value(created)),
            ]),
        );
    }
    store.commit(batch).await?;

    let found = store
        .query(
            &Query::collection(comments)
                .where_eq("mediaId", "m1")
                .order_by_asc("createdAt"),
        )
        .await?;

    let ids: Vec<&str> = found.iter().map(|doc| doc.id.as_str()).collect();
    assert_eq!(ids, ["b", "a", "c"]);
    Ok(())
}

#[tokio::test]
async fn document_listener_skips_unchanged_results() -> color_eyre::Result<()> {
    let Some(store) = document_store().await? else {
        return Ok(());
    };
    // ARRANGE
    let stats = DocumentRef::new(scratch_collection("stats"), "m1");
    let (tx, mut rx) = mpsc::unbounded_channel::<Option<Document>>();
    let subscription = store
        .listen_document(
            stats.clone(),
            Arc::new(move |doc: Option<Document>| {
                let _ = tx.send(doc);
            }),
        )
        .await?;
    let initial = timeout(WAIT, rx.recv()).await?;

    // ACT
    let mut set = WriteBatch::new();
    set.set(stats.clone(), fields([("likeCount", FieldValue::value(1))]));
    store.commit(set.clone()).await?;
    let changed = timeout(WAIT, rx.recv()).await?;
    store.commit(set).await?;
    let unchanged = timeout(Duration::from_millis(500), rx.recv()).await;

    // ASSERT
    assert_eq!(initial, Some(None));
    let changed = changed.flatten().expect("stats document");
    assert_eq!(changed.data.get("likeCount"), Some(&json!(1)));
    assert!(unchanged.is_err(), "rewriting the same data must not call back");
    subscription.unsubscribe();
    Ok(())
}

#[tokio::test]
async fn query_listener_sees_matches_arrive_and_leave() -> color_eyre::Result<()> {
    let Some(store) = document_store().await? else {
        return Ok(());
    };
    // ARRANGE
    let likes = scratch_collection("likes");
    let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
    let _subscription = store
        .listen_query(
            Query::collection(likes.clone()).where_eq("mediaId", "m1"),
            Arc::new(move |docs: Vec<Document>| {
                let _ = tx.send(docs.len());
            }),
        )
        .await?;
    let like = DocumentRef::new(likes.clone(), "u1_m1");
    let mut seen = vec![timeout(WAIT, rx.recv()).await?.expect("listener alive")];

    // ACT
    let mut add = WriteBatch::new();
    add.create(like.clone(), fields([("mediaId", FieldValue::value("m1"))]));
    store.commit(add).await?;
    seen.push(timeout(WAIT, rx.recv()).await?.expect("listener alive"));
    let mut remove = WriteBatch::new();
    remove.delete_existing(like);
    store.commit(remove).await?;
    seen.push(timeout(WAIT, rx.recv()).await?.expect("listener alive"));

    // ASSERT
    assert_eq!(seen, [0, 1, 0]);
    Ok(())
}

#[tokio::test]
async fn dropping_the_last_store_clone_stops_the_change_feed() -> color_eyre::Result<()> {
    let Some(store) = document_store().await? else {
        return Ok(());
    };
    let mut changes = store.changes();
    let clone = store.clone();

    drop(store);
    drop(clone);
    // Changes written by other tests may still be queued ahead of the close.
    let closed = timeout(WAIT, async {
        while !matches!(changes.recv().await, Err(RecvError::Closed)) {}
    })
    .await;

    assert!(closed.is_ok(), "change feed stayed open");
    Ok(())
}

//================================================================================
// Engagement on Postgres
//================================================================================

#[tokio::test]
async fn recount_racing_new_likes_keeps_every_like() -> color_eyre::Result<()> {
    let Some(store) = document_store().await? else {
        return Ok(());
    };
    // ARRANGE
    let service = Arc::new(EngagementService::new(store, &engagement_constants()));
    let media_id = nice_id(16);
    service.add_like(&media_id, "a1", "seed", "Seed").await?;

    // ACT
    let mut tasks = Vec::new();
    for i in 0..24 {
        let service = service.clone();
        let media_id = media_id.clone();
        tasks.push(tokio::spawn(async move {
            if i % 4 == 0 {
                service.recount_media_stats(&media_id).await.map(|_| ())
            } else {
                let user = format!("u{i}");
                service.add_like(&media_id, "a1", &user, &user).await.map(|_| ())
            }
        }));
    }
    for task in tasks {
        task.await??;
    }

    // ASSERT
    let rows = service
        .store()
        .query(&Query::collection(LIKES).where_eq("mediaId", media_id.as_str()))
        .await?;
    assert_eq!(rows.len(), 19);
    assert_eq!(service.get_media_stats(&media_id).await?.like_count, 19);
    Ok(())
}

#[tokio::test]
async fn liking_twice_on_postgres_counts_once() -> color_eyre::Result<()> {
    let Some(store) = document_store().await? else {
        return Ok(());
    };
    let service = EngagementService::new(store, &engagement_constants());
    let media_id = nice_id(16);

    let first = service.add_like(&media_id, "a1", "u1", "Ada").await?;
    let second = service.add_like(&media_id, "a1", "u1", "Ada").await?;
    let removed = service.remove_like(&media_id, "u1").await?;
    let removed_again = service.remove_like(&media_id, "u1").await?;

    assert_eq!(first, LikeOutcome::Liked);
    assert!(second.already_liked());
    assert!(!removed.not_found());
    assert!(removed_again.not_found());
    assert_eq!(service.get_media_stats(&media_id).await?.like_count, 0);
    Ok(())
}

//================================================================================
// Albums on Postgres
//================================================================================

fn fresh_user() -> User {
    let id = nice_id(12);
    User {
        email: format!("{id}@example.com"),
        display_name: None,
        created_at: Utc::now(),
        id,
    }
}

#[tokio::test]
async fn owner_permission_row_cannot_be_overwritten_or_removed() -> color_eyre::Result<()> {
    let Some(pool) = postgres_pool().await? else {
        return Ok(());
    };
    // ARRANGE
    let repo = PgAlbumStore::new(pool);
    let (owner, guest) = (fresh_user(), fresh_user());
    repo.upsert_user(&owner).await?;
    repo.upsert_user(&guest).await?;
    let album = Album {
        id: nice_id(12),
        title: "Summer".to_owned(),
        description: None,
        owner_id: owner.id.clone(),
        is_event: false,
        created_at: Utc::now(),
    };
    repo.create_album(&album).await?;

    // ACT
    let overwrite = repo
        .upsert_permission(&album.id, &owner.id, AlbumRole::Viewer)
        .await;
    let removed_owner = repo.delete_permission(&album.id, &owner.id).await?;
    let granted = repo
        .upsert_permission(&album.id, &guest.id, AlbumRole::Editor)
        .await?;
    let removed_guest = repo.delete_permission(&album.id, &guest.id).await?;

    // ASSERT
    assert!(matches!(overwrite, Err(DbError::Constraint(_))));
    assert!(!removed_owner);
    assert_eq!(granted.role, AlbumRole::Editor);
    assert!(removed_guest);
    let owner_row = repo
        .find_permission(&album.id, &owner.id)
        .await?
        .expect("owner permission");
    assert_eq!(owner_row.role, AlbumRole::Owner);
    Ok(())
}

#[tokio::test]
async fn access_rules_hold_on_postgres() -> color_eyre::Result<()> {
    let Some(pool) = postgres_pool().await? else {
        return Ok(());
    };
    // ARRANGE
    let service = AccessService::new(PgAlbumStore::new(pool), &database_constants());
    let (owner, editor) = (user(&nice_id(12)), user(&nice_id(12)));
    service.sync_user(Some(&editor)).await?;
    let album = service
        .create_album(Some(&owner), NewAlbum::builder().title("Summer").build())
        .await?;

    // ACT
    service
        .grant_permission(Some(&owner), &album.id, &editor.email, AlbumRole::Editor)
        .await?;
    let editor_grant = service
        .grant_permission(Some(&editor), &album.id, &owner.email, AlbumRole::Viewer)
        .await;
    let revoke_owner = service
        .revoke_permission(Some(&owner), &album.id, &owner.uid)
        .await;
    service
        .revoke_permission(Some(&owner), &album.id, &editor.uid)
        .await?;
    let listed = service.list_permissions(Some(&owner), &album.id).await?;

    // ASSERT
    assert!(matches!(editor_grant, Err(AccessError::Forbidden(_))));
    assert!(matches!(revoke_owner, Err(AccessError::Forbidden(_))));
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].role, AlbumRole::Owner);
    service.delete_album(Some(&owner), &album.id).await?;
    assert!(service.get_album(Some(&owner), &album.id).await.is_err());
    Ok(())
}
