//! The sync controller over the Supabase session store and record service,
//! against a canned HTTP server standing in for the auth and REST APIs.
//!
//! Each test signs in with a fresh session, starts the controller, then lets
//! the access token lapse so the next write has to refresh it first.

#[path = "../common/http_stub.rs"]
mod http_stub;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use serde_json::json;

use http_stub::{Route, StubServer};
use smartmarks::database::Database;
use smartmarks::managers::sync_controller::{
    SignInOptions, SyncCollaborators, SyncController, SyncControllerTrait,
};
use smartmarks::platform::UrlOpener;
use smartmarks::services::change_feed::LocalChangeFeed;
use smartmarks::services::supabase_client::SupabaseClient;
use smartmarks::services::supabase_record_service::SupabaseRecordService;
use smartmarks::services::supabase_session_store::{RefreshPolicy, SupabaseSessionStore};
use smartmarks::types::errors::{PersistenceError, SyncError};

struct NoBrowser;

impl UrlOpener for NoBrowser {
    fn open(&self, _url: &str) -> Result<(), String> {
        Err("no browser in tests".to_string())
    }
}

fn jwt(sub: &str, exp: i64) -> String {
    let claims = format!(r#"{{"sub":"{}","email":"ada@example.com","exp":{}}}"#, sub, exp);
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims)
    )
}

fn callback(expires_at: i64) -> String {
    format!(
        "http://localhost:3000/auth/callback#access_token={}&expires_at={}&expires_in=3600&refresh_token=refresh-1&token_type=bearer",
        jwt("user-1", expires_at),
        expires_at
    )
}

fn token_granted(access_token: &str) -> String {
    json!({
        "access_token": access_token,
        "refresh_token": "refresh-2",
        "expires_in": 3600,
        "token_type": "bearer",
        "user": {"id": "user-1", "email": "ada@example.com"}
    })
    .to_string()
}

fn inserted_row() -> String {
    json!({
        "id": "b-1",
        "user_id": "user-1",
        "title": "Docs",
        "url": "https://x.dev/",
        "created_at": "2026-10-17T10:00:00Z"
    })
    .to_string()
}

struct Backend {
    server: StubServer,
    sessions: Arc<SupabaseSessionStore>,
    controller: SyncController,
}

/// A started controller signed in as `user-1` whose access token has
/// already lapsed.
async fn lapsed_session(routes: Vec<Route>) -> Backend {
    let mut routes = routes;
    routes.push(Route::new("GET", "/rest/v1/bookmarks", 200, "[]"));
    let server = StubServer::start(routes).await;

    let client = SupabaseClient::new(server.url(), "anon-key");
    let db = Database::open_in_memory().unwrap().into_shared();
    let policy = RefreshPolicy {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    };
    let sessions = Arc::new(
        SupabaseSessionStore::new(client.clone(), db, Arc::new(NoBrowser)).with_refresh_policy(policy),
    );
    let feed = LocalChangeFeed::new();
    let records = Arc::new(SupabaseRecordService::new(
        client,
        "bookmarks",
        sessions.clone(),
        feed.clone(),
    ));

    sessions
        .complete_sign_in(&callback(Utc::now().timestamp() + 3600))
        .await
        .unwrap();
    let controller = SyncController::new(
        SyncCollaborators {
            sessions: sessions.clone(),
            records,
            feed: Arc::new(feed),
        },
        SignInOptions::default(),
    );
    controller.start().await.unwrap();
    assert_eq!(controller.session().unwrap().user_id, "user-1");

    // Same user, token already past its expiry.
    sessions
        .complete_sign_in(&callback(Utc::now().timestamp() - 60))
        .await
        .unwrap();

    Backend {
        server,
        sessions,
        controller,
    }
}

async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_lapsed_token_is_refreshed_before_insert() {
    let fresh = jwt("user-1", Utc::now().timestamp() + 3600);
    let b = lapsed_session(vec![
        Route::new("POST", "/auth/v1/token", 200, token_granted(&fresh)),
        Route::new("POST", "/rest/v1/bookmarks", 201, inserted_row()),
    ])
    .await;

    let record = b.controller.add_bookmark("Docs", "https://x.dev").await.unwrap();
    assert_eq!(record.id, "b-1");

    let inserts = b.server.hits("POST", "/rest/v1/bookmarks");
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].authorization, Some(format!("Bearer {}", fresh)));

    let refreshes = b.server.hits("POST", "/auth/v1/token");
    assert_eq!(refreshes.len(), 1);
    assert!(refreshes[0].body.contains("refresh-1"));

    let stored = b.sessions.load().unwrap().unwrap();
    assert_eq!(stored.tokens.refresh_token, "refresh-2");
    assert_eq!(b.controller.session().unwrap().user_id, "user-1");
}

#[tokio::test]
async fn test_refused_refresh_signs_controller_out() {
    let b = lapsed_session(vec![Route::new(
        "POST",
        "/auth/v1/token",
        400,
        r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token: Already Used"}"#,
    )])
    .await;

    let err = b.controller.add_bookmark("Docs", "https://x.dev").await.unwrap_err();
    assert_eq!(err, SyncError::Persistence(PersistenceError::Unauthenticated));
    assert!(b.server.hits("POST", "/rest/v1/bookmarks").is_empty());

    let controller = &b.controller;
    eventually(|| controller.session().is_none()).await;
    assert!(b.sessions.load().unwrap().is_none());
    assert!(controller.bookmarks().is_empty());
}

#[tokio::test]
async fn test_unreachable_auth_server_keeps_controller_signed_in() {
    let b = lapsed_session(vec![Route::new(
        "POST",
        "/auth/v1/token",
        503,
        r#"{"message":"upstream unavailable"}"#,
    )])
    .await;

    let err = b.controller.add_bookmark("Docs", "https://x.dev").await.unwrap_err();
    assert!(matches!(err, SyncError::Persistence(PersistenceError::Network(_))));

    // Both attempts of the policy were spent, and nothing was written.
    assert_eq!(b.server.hits("POST", "/auth/v1/token").len(), 2);
    assert!(b.server.hits("POST", "/rest/v1/bookmarks").is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(b.controller.session().unwrap().user_id, "user-1");
    let stored = b.sessions.load().unwrap().unwrap();
    assert_eq!(stored.tokens.refresh_token, "refresh-1");
}
