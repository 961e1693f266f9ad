use axum::extract::{Multipart, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use common_services::api_client::{AlbumApiClient, ApiClientError, UploadFile};
use common_services::error::{ErrorKind, UserFacingError};
use common_services::identity::{CurrentUser, StaticIdentity};
use common_types::AlbumRole;
use serde::Deserialize;
use serde_json::json;
use url::Url;

const TOKEN: &str = "token-1";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Invalid token"})),
    )
        .into_response()
}

async fn list_permissions(headers: HeaderMap, Path(album_id): Path<String>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "permissions": [
            {"user_uid": "u1", "email": "u1@example.com", "display_name": "Ada", "role": "owner"},
            {"user_uid": format!("{album_id}-guest"), "email": "g@example.com", "display_name": null, "role": "viewer"}
        ]
    }))
    .into_response()
}

#[derive(Deserialize)]
struct AddPermission {
    email: String,
    role: AlbumRole,
}

async fn add_permission(headers: HeaderMap, Json(body): Json<AddPermission>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if body.email != "bob@example.com" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "User not found"})),
        )
            .into_response();
    }
    Json(json!({
        "permission": {"user_uid": "u2", "email": body.email, "display_name": "Bob", "role": body.role}
    }))
    .into_response()
}

async fn remove_permission() -> StatusCode {
    StatusCode::FORBIDDEN
}

#[derive(Deserialize)]
struct Search {
    email: String,
}

async fn search_users(headers: HeaderMap, Query(search): Query<Search>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "users": [{"uid": "u2", "email": search.email, "display_name": null, "created_at": "2025-01-01T00:00:00Z"}]
    }))
    .into_response()
}

async fn upload(Path(album_id): Path<String>, mut multipart: Multipart) -> Response {
    let mut media = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("images") {
            return StatusCode::BAD_REQUEST.into_response();
        }
        let filename = field.file_name().unwrap_or_default().to_owned();
        let content_type = field.content_type().unwrap_or_default().to_owned();
        let bytes = field.bytes().await.map(|b| b.len()).unwrap_or_default();
        media.push(json!({
            "id": format!("m{}", media.len()),
            "album_id": album_id,
            "url": format!("https://cdn/{filename}?type={content_type}&size={bytes}"),
            "filename": filename,
            "uploader_uid": "u1",
            "created_at": "2025-01-01T00:00:00Z"
        }));
    }
    Json(json!({ "media": media })).into_response()
}

async fn broken_event() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn spawn_server() -> color_eyre::Result<Url> {
    let router = Router::new()
        .route(
            "/api/albums/{album_id}/permissions",
            get(list_permissions).post(add_permission),
        )
        .route(
            "/api/albums/{album_id}/permissions/{user_uid}",
            delete(remove_permission),
        )
        .route("/api/albums/{album_id}/upload", post(upload))
        .route("/api/users/search", get(search_users))
        .route("/api/events/{event_id}", get(broken_event));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, router).await });
    Ok(Url::parse(&format!("http://{addr}/api/"))?)
}

fn signed_in() -> StaticIdentity {
    StaticIdentity::signed_in(
        CurrentUser {
            uid: "u1".to_owned(),
            email: "u1@example.com".to_owned(),
            display_name: Some("Ada".to_owned()),
        },
        TOKEN,
    )
}

#[tokio::test]
async fn reads_permissions_with_bearer_token() -> color_eyre::Result<()> {
    // ARRANGE
    let base_url = spawn_server().await?;
    let client = AlbumApiClient::with_base_url(reqwest::Client::new(), base_url, signed_in());

    // ACT
    let permissions = client.list_permissions("a1").await?;

    // ASSERT
    assert_eq!(permissions.len(), 2);
    assert_eq!(permissions[0].role, AlbumRole::Owner);
    assert_eq!(permissions[1].user_id, "a1-guest");
    assert_eq!(permissions[1].display_name, None);
    Ok(())
}

#[tokio::test]
async fn wrong_token_is_unauthenticated() -> color_eyre::Result<()> {
    let base_url = spawn_server().await?;
    let identity = StaticIdentity::signed_in(
        CurrentUser {
            uid: "u1".to_owned(),
            email: "u1@example.com".to_owned(),
            display_name: None,
        },
        "stale",
    );
    let client = AlbumApiClient::with_base_url(reqwest::Client::new(), base_url, identity);

    let err = client.list_permissions("a1").await.err().expect("should fail");

    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert_eq!(err.user_message(), "Invalid token");
    Ok(())
}

#[tokio::test]
async fn add_permission_surfaces_server_message() -> color_eyre::Result<()> {
    let base_url = spawn_server().await?;
    let client = AlbumApiClient::with_base_url(reqwest::Client::new(), base_url, signed_in());

    let added = client
        .add_permission("a1", " bob@example.com ", AlbumRole::Editor)
        .await?;
    let missing = client
        .add_permission("a1", "carol@example.com", AlbumRole::Viewer)
        .await;

    assert_eq!(added.user_id, "u2");
    assert_eq!(added.role, AlbumRole::Editor);
    match missing {
        Err(ApiClientError::Status { status, message }) => {
            assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
            assert_eq!(message, "User not found");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn empty_error_bodies_fall_back_to_operation_message() -> color_eyre::Result<()> {
    let base_url = spawn_server().await?;
    let client = AlbumApiClient::with_base_url(reqwest::Client::new(), base_url, signed_in());

    let forbidden = client.remove_permission("a1", "u2").await.err().expect("forbidden");
    let broken = client.get_event("e1").await.err().expect("server error");

    assert_eq!(forbidden.kind(), ErrorKind::Forbidden);
    assert_eq!(forbidden.message(), "Removing permission failed");
    assert_eq!(broken.kind(), ErrorKind::Transient);
    assert!(broken.kind().is_retryable());
    assert_eq!(broken.message(), "Loading event failed");
    Ok(())
}

#[tokio::test]
async fn uploads_files_as_images_fields() -> color_eyre::Result<()> {
    let base_url = spawn_server().await?;
    let client = AlbumApiClient::with_base_url(reqwest::Client::new(), base_url, signed_in());

    let media = client
        .upload_media(
            "a1",
            vec![
                UploadFile::new("beach.jpg", vec![1, 2, 3]),
                UploadFile::new("clip.mp4", vec![4; 10]),
            ],
        )
        .await?;

    assert_eq!(media.len(), 2);
    assert_eq!(media[0].filename, "beach.jpg");
    assert_eq!(media[0].url, "https://cdn/beach.jpg?type=image/jpeg&size=3");
    assert!(media[1].is_video());
    assert_eq!(media[1].album_id, "a1");
    Ok(())
}

#[tokio::test]
async fn search_encodes_email_query() -> color_eyre::Result<()> {
    let base_url = spawn_server().await?;
    let client = AlbumApiClient::with_base_url(reqwest::Client::new(), base_url, signed_in());

    let users = client.search_users("bob+photos@example.com").await?;

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "bob+photos@example.com");
    Ok(())
}

#[tokio::test]
async fn signed_out_client_never_sends_requests() {
    let client = AlbumApiClient::with_base_url(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9/api/").expect("valid url"),
        StaticIdentity::anonymous(),
    );

    let err = client.list_albums().await.err().expect("not signed in");

    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
}
