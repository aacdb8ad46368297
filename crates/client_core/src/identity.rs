//! Holds the current authenticated principal and tracks provider auth events.

use std::sync::Arc;

use serde_json::json;
use shared::{
    domain::{Principal, Session},
    error::GridError,
};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::warn;

use crate::{AuthChange, IdentityProvider, LogBuffer};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    /// Initial restore check has not completed yet.
    Loading,
    Ready(Option<Session>),
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Changed(Option<Principal>),
}

/// Uniform result shape for sign-in/sign-up, so callers never need
/// exception handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl AuthOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Identity session holder.
///
/// Performs one session-restore check at startup, then consumes the
/// provider's auth-event subscription for the rest of the process lifetime.
/// Every event replaces the held session/user pair atomically.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    log: LogBuffer,
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, log: LogBuffer) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            provider,
            log,
            state: RwLock::new(SessionState::Loading),
            events,
            watcher: Mutex::new(None),
        })
    }

    /// Restore check plus the persistent auth-event watcher.
    pub async fn initialize(self: &Arc<Self>) {
        let restored = match self.provider.restore_session().await {
            Ok(session) => {
                match &session {
                    Some(session) => self.log.info(
                        "session restored",
                        Some(json!({ "email": session.user.email })),
                    ),
                    None => self.log.info("no persisted session", None),
                }
                session
            }
            Err(err) => {
                self.log.warning(
                    "session restore failed",
                    Some(json!({ "detail": format!("{err:#}") })),
                );
                None
            }
        };
        self.replace_session(restored).await;

        let mut changes = self.provider.subscribe();
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => manager.apply_change(change).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth change stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        let previous = { self.watcher.lock().await.replace(task) };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn apply_change(&self, change: AuthChange) {
        let session = match change {
            AuthChange::SignedIn(session) | AuthChange::TokenRefreshed(session) => Some(session),
            AuthChange::SignedOut => None,
        };
        self.replace_session(session).await;
    }

    async fn replace_session(&self, session: Option<Session>) {
        let principal = session.as_ref().map(|session| session.user.clone());
        {
            let mut state = self.state.write().await;
            *state = SessionState::Ready(session);
        }
        let _ = self.events.send(SessionEvent::Changed(principal));
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthOutcome {
        match self.provider.sign_up(email, password).await {
            Ok(session) => {
                self.log
                    .success("account created", Some(json!({ "email": email })));
                self.replace_session(Some(session)).await;
                AuthOutcome::ok()
            }
            Err(err) => {
                self.log.error(
                    "sign up failed",
                    Some(json!({ "email": email, "detail": format!("{err:#}") })),
                );
                AuthOutcome::failed("Sign-up failed; check the email address and password")
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome {
        match self.provider.sign_in(email, password).await {
            Ok(session) => {
                self.log
                    .success("signed in", Some(json!({ "email": email })));
                self.replace_session(Some(session)).await;
                AuthOutcome::ok()
            }
            Err(err) => {
                self.log.error(
                    "sign in failed",
                    Some(json!({ "email": email, "detail": format!("{err:#}") })),
                );
                AuthOutcome::failed("Sign-in failed; check the email address and password")
            }
        }
    }

    /// Fire-and-forget: provider failures are logged, never surfaced, and
    /// the local session is cleared regardless.
    pub async fn sign_out(&self) {
        let token = {
            match &*self.state.read().await {
                SessionState::Ready(Some(session)) => Some(session.access_token.clone()),
                _ => None,
            }
        };
        if let Some(token) = token {
            if let Err(err) = self.provider.sign_out(&token).await {
                self.log.warning(
                    "sign out failed upstream, clearing local session anyway",
                    Some(json!({ "detail": format!("{err:#}") })),
                );
            } else {
                self.log.info("signed out", None);
            }
        }
        self.replace_session(None).await;
    }

    pub async fn is_loading(&self) -> bool {
        matches!(&*self.state.read().await, SessionState::Loading)
    }

    pub async fn current_session(&self) -> Option<Session> {
        match &*self.state.read().await {
            SessionState::Ready(session) => session.clone(),
            SessionState::Loading => None,
        }
    }

    pub async fn principal(&self) -> Option<Principal> {
        self.current_session().await.map(|session| session.user)
    }

    /// Token for a mutating call; absent session maps to `AuthRequired`.
    pub async fn access_token(&self) -> Result<String, GridError> {
        match &*self.state.read().await {
            SessionState::Ready(Some(session)) => Ok(session.access_token.clone()),
            _ => Err(GridError::AuthRequired),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Deterministically stop consuming provider events.
    pub async fn shutdown(&self) {
        if let Some(task) = self.watcher.lock().await.take() {
            task.abort();
        }
    }
}
