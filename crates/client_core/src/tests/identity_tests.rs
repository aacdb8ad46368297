use std::{sync::Arc, time::Duration};

use chrono::Utc;
use shared::{
    domain::{Principal, Session},
    error::GridError,
};
use tokio::time::timeout;

use super::{harness, FakeIdentityProvider};
use crate::{AuthChange, IdentityProvider, LogBuffer, SessionEvent, SessionManager};

#[tokio::test]
async fn sign_in_after_sign_out_restores_the_same_principal() {
    let h = harness().await;

    let outcome = h.session.sign_up("carol@example.com", "pw").await;
    assert!(outcome.success);
    let first = h.session.principal().await.expect("signed in");

    h.session.sign_out().await;
    assert!(h.session.principal().await.is_none());

    let outcome = h.session.sign_in("carol@example.com", "pw").await;
    assert!(outcome.success);
    let second = h.session.principal().await.expect("signed back in");

    assert_eq!(first.user_id, second.user_id);
    assert_eq!(second.email, "carol@example.com");
}

#[tokio::test]
async fn wrong_password_yields_a_failed_outcome_without_a_session() {
    let h = harness().await;
    h.session.sign_up("carol@example.com", "pw").await;
    h.session.sign_out().await;

    let outcome = h.session.sign_in("carol@example.com", "wrong").await;
    assert!(!outcome.success);
    assert!(outcome.error.is_some());
    assert!(h.session.principal().await.is_none());
    assert!(matches!(
        h.session.access_token().await,
        Err(GridError::AuthRequired)
    ));
}

#[tokio::test]
async fn duplicate_sign_up_fails() {
    let h = harness().await;
    assert!(h.session.sign_up("carol@example.com", "pw").await.success);
    let outcome = h.session.sign_up("carol@example.com", "other").await;
    assert!(!outcome.success);
}

#[tokio::test]
async fn persisted_session_is_restored_on_initialize() {
    let provider = Arc::new(FakeIdentityProvider::new());
    provider.set_persisted(Some(Session {
        access_token: "persisted-access".into(),
        refresh_token: "persisted-refresh".into(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        user: Principal {
            user_id: "user-42".into(),
            email: "restored@example.com".into(),
        },
    }));

    let session = SessionManager::new(
        Arc::clone(&provider) as Arc<dyn IdentityProvider>,
        LogBuffer::new(),
    );
    assert!(session.is_loading().await);
    session.initialize().await;

    assert!(!session.is_loading().await);
    let principal = session.principal().await.expect("restored principal");
    assert_eq!(principal.user_id, "user-42");
    assert_eq!(session.access_token().await.unwrap(), "persisted-access");
    session.shutdown().await;
}

#[tokio::test]
async fn failed_restore_leaves_the_session_empty() {
    let session = SessionManager::new(
        Arc::new(crate::MissingIdentityProvider::new()),
        LogBuffer::new(),
    );
    session.initialize().await;
    assert!(!session.is_loading().await);
    assert!(session.principal().await.is_none());
    session.shutdown().await;
}

#[tokio::test]
async fn provider_pushed_sign_out_clears_the_session() {
    let h = harness().await;
    h.session.sign_up("carol@example.com", "pw").await;
    assert!(h.session.principal().await.is_some());

    let mut events = h.session.subscribe();
    h.identity.emit(AuthChange::SignedOut);

    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event within deadline")
        .expect("channel open");
    let SessionEvent::Changed(principal) = event;
    assert!(principal.is_none());
    assert!(h.session.principal().await.is_none());
}

#[tokio::test]
async fn provider_token_refresh_replaces_the_held_session() {
    let h = harness().await;
    h.session.sign_up("carol@example.com", "pw").await;
    let principal = h.session.principal().await.expect("signed in");

    let mut events = h.session.subscribe();
    h.identity.emit(AuthChange::TokenRefreshed(Session {
        access_token: "rotated".into(),
        refresh_token: "rotated-refresh".into(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        user: principal.clone(),
    }));

    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event within deadline")
        .expect("channel open");
    assert_eq!(h.session.access_token().await.unwrap(), "rotated");
    assert_eq!(h.session.principal().await, Some(principal));
}
