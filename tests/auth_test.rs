mod common;

use serde_json::Value;
use std::sync::atomic::Ordering;

use common::{PROJECT, harness};
use squirrels_studio::auth;
use squirrels_studio::catalog::DataMode;
use squirrels_studio::{ApiClient, Outcome, StudioError};

async fn sent_cookie(client: &ApiClient) -> String {
    let echo: Value = client.get_json(&format!("{}/cookie-echo", PROJECT)).await.unwrap();
    echo["cookie"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_invalidated_session_drops_server_cookie() {
    let mut h = harness().await;
    h.explorer.open_project("demo", "v1").await;
    auth::login(&h.client, PROJECT, "alice", "pw").await.unwrap();
    assert!(sent_cookie(&h.client).await.contains("sid=alice"));

    h.state.impersonate.store(true, Ordering::SeqCst);
    assert_eq!(h.explorer.select(DataMode::Dataset, None).await, Outcome::Failed);
    assert!(!h.ctx.is_authenticated());
    assert!(h.notices.notices().last().unwrap().logout);

    assert!(!sent_cookie(&h.client).await.contains("sid="));
}

#[tokio::test]
async fn test_surfaced_invalidation_drops_server_cookie() {
    let h = harness().await;
    auth::login(&h.client, PROJECT, "alice", "pw").await.unwrap();

    h.state.impersonate.store(true, Ordering::SeqCst);
    let err = auth::user_info(&h.client, PROJECT).await.unwrap_err();
    assert!(matches!(err, StudioError::SessionInvalidated { .. }));
    h.ctx.surface(&err);

    assert!(!sent_cookie(&h.client).await.contains("sid="));
}

#[tokio::test]
async fn test_expired_session_drops_server_cookie() {
    let h = harness().await;
    auth::login(&h.client, PROJECT, "alice", "pw").await.unwrap();
    assert!(sent_cookie(&h.client).await.contains("sid=alice"));

    h.ctx.force_logout("Session Expired", "User session expired");
    assert_eq!(sent_cookie(&h.client).await, "");

    auth::login(&h.client, PROJECT, "alice", "pw").await.unwrap();
    assert!(sent_cookie(&h.client).await.contains("sid=alice"));
}

#[tokio::test]
async fn test_user_fields_hide_builtin_columns() {
    let h = harness().await;
    assert!(matches!(
        auth::user_fields(&h.client, PROJECT).await,
        Err(StudioError::AuthRequired)
    ));

    auth::login(&h.client, PROJECT, "alice", "pw").await.unwrap();
    let fields = auth::user_fields(&h.client, PROJECT).await.unwrap();
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["team", "age"]);
    assert!(fields[0].nullable);
    assert_eq!(fields[1].default, Some(serde_json::json!(30)));
}
