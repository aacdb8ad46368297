//! REST implementations of the identity and object-storage collaborators.
//!
//! The identity side speaks the email/password token API
//! (`/auth/v1/signup`, `/auth/v1/token`, `/auth/v1/logout`); the storage
//! side speaks the bucket/object API under `/storage/v1`. Every request
//! carries the public `apikey` header; mutating storage calls additionally
//! carry the session bearer token.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use shared::{
    domain::{Principal, Session},
    protocol::{
        BucketSummary, CreateBucketRequest, ObjectSummary, PasswordCredentials, RefreshRequest,
        RemoveObjectsRequest, TokenResponse,
    },
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{AuthChange, IdentityProvider, ObjectStore, Settings};

/// Refresh this long before the access token actually expires.
const REFRESH_LEEWAY: Duration = Duration::from_secs(30);

fn session_from_token_response(response: TokenResponse) -> Session {
    Session {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expires_at: Utc::now() + chrono::Duration::seconds(response.expires_in),
        user: Principal {
            user_id: response.user.id,
            email: response.user.email,
        },
    }
}

/// Default location of the persisted session, the local analog of the
/// browser's localStorage session entry.
pub fn default_session_file() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("photowall").join("session.json"))
}

struct IdentityCore {
    http: Client,
    api_url: String,
    api_key: String,
    session_file: Option<PathBuf>,
    events: broadcast::Sender<AuthChange>,
}

impl IdentityCore {
    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
        let response: TokenResponse = self
            .http
            .post(format!("{}/auth/v1/token", self.api_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("token request ({grant_type}) failed to send"))?
            .error_for_status()
            .with_context(|| format!("token request ({grant_type}) rejected"))?
            .json()
            .await
            .context("invalid token response payload")?;
        Ok(session_from_token_response(response))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        self.token_grant(
            "refresh_token",
            serde_json::to_value(RefreshRequest {
                refresh_token: refresh_token.to_string(),
            })?,
        )
        .await
    }

    async fn persist(&self, session: Option<&Session>) {
        let Some(path) = &self.session_file else {
            return;
        };
        let result = match session {
            Some(session) => write_session_file(path, session).await,
            None => remove_session_file(path).await,
        };
        if let Err(err) = result {
            warn!("failed to persist session state: {err:#}");
        }
    }
}

async fn write_session_file(path: &Path, session: &Session) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating session directory '{}'", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(session)?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("writing session file '{}'", path.display()))
}

async fn remove_session_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("removing session file '{}'", path.display())),
    }
}

/// Email/password identity service client with session persistence and
/// background token refresh.
pub struct RestIdentityProvider {
    core: Arc<IdentityCore>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl RestIdentityProvider {
    pub fn new(settings: &Settings) -> Self {
        Self::with_session_file(settings, default_session_file())
    }

    /// Explicit session-file location; `None` disables persistence.
    pub fn with_session_file(settings: &Settings, session_file: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            core: Arc::new(IdentityCore {
                http: Client::new(),
                api_url: settings.api_url.clone(),
                api_key: settings.api_key.clone(),
                session_file,
                events,
            }),
            refresh_task: Mutex::new(None),
        }
    }

    /// Keep the session fresh: sleep until shortly before expiry, refresh,
    /// emit `TokenRefreshed`. A failed refresh signs the session out.
    async fn schedule_refresh(&self, session: &Session) {
        let core = Arc::clone(&self.core);
        let mut current = session.clone();
        let task = tokio::spawn(async move {
            loop {
                let until_expiry = (current.expires_at - Utc::now())
                    .to_std()
                    .unwrap_or_default();
                tokio::time::sleep(until_expiry.saturating_sub(REFRESH_LEEWAY)).await;
                match core.refresh(&current.refresh_token).await {
                    Ok(next) => {
                        info!(email = %next.user.email, "access token refreshed");
                        core.persist(Some(&next)).await;
                        let _ = core.events.send(AuthChange::TokenRefreshed(next.clone()));
                        current = next;
                    }
                    Err(err) => {
                        warn!("token refresh failed, signing out: {err:#}");
                        core.persist(None).await;
                        let _ = core.events.send(AuthChange::SignedOut);
                        break;
                    }
                }
            }
        });
        let previous = { self.refresh_task.lock().await.replace(task) };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn cancel_refresh(&self) {
        if let Some(task) = self.refresh_task.lock().await.take() {
            task.abort();
        }
    }

    async fn read_persisted(&self) -> Result<Option<Session>> {
        let Some(path) = &self.core.session_file else {
            return Ok(None);
        };
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading session file '{}'", path.display()))
            }
        };
        let session: Session = serde_json::from_slice(&raw)
            .with_context(|| format!("malformed session file '{}'", path.display()))?;
        Ok(Some(session))
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn restore_session(&self) -> Result<Option<Session>> {
        let Some(persisted) = self.read_persisted().await? else {
            return Ok(None);
        };
        // "near expiry" means expired once the refresh leeway is spent
        let leeway = chrono::Duration::from_std(REFRESH_LEEWAY).unwrap_or_default();
        let near_expiry = persisted.is_expired_at(Utc::now() + leeway);
        let session = if near_expiry {
            match self.core.refresh(&persisted.refresh_token).await {
                Ok(session) => session,
                Err(err) => {
                    // persisted tokens are unusable; discard them
                    warn!("persisted session could not be refreshed: {err:#}");
                    self.core.persist(None).await;
                    return Ok(None);
                }
            }
        } else {
            persisted
        };
        self.core.persist(Some(&session)).await;
        self.schedule_refresh(&session).await;
        Ok(Some(session))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        let response: TokenResponse = self
            .core
            .http
            .post(format!("{}/auth/v1/signup", self.core.api_url))
            .header("apikey", &self.core.api_key)
            .json(&PasswordCredentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .context("signup request failed to send")?
            .error_for_status()
            .context("signup rejected")?
            .json()
            .await
            .context("invalid signup response payload")?;
        let session = session_from_token_response(response);
        self.core.persist(Some(&session)).await;
        self.schedule_refresh(&session).await;
        let _ = self.core.events.send(AuthChange::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .core
            .token_grant(
                "password",
                serde_json::to_value(PasswordCredentials {
                    email: email.to_string(),
                    password: password.to_string(),
                })?,
            )
            .await?;
        self.core.persist(Some(&session)).await;
        self.schedule_refresh(&session).await;
        let _ = self.core.events.send(AuthChange::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.cancel_refresh().await;
        let result = self
            .core
            .http
            .post(format!("{}/auth/v1/logout", self.core.api_url))
            .header("apikey", &self.core.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .context("logout request failed to send")
            .and_then(|response| response.error_for_status().context("logout rejected"));
        // local state is cleared even when the upstream call failed
        self.core.persist(None).await;
        let _ = self.core.events.send(AuthChange::SignedOut);
        result.map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.core.events.subscribe()
    }
}

/// Bucket/object storage client.
pub struct RestObjectStore {
    http: Client,
    api_url: String,
    api_key: String,
}

impl RestObjectStore {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: Client::new(),
            api_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for RestObjectStore {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        self.http
            .get(format!("{}/storage/v1/bucket", self.api_url))
            .header("apikey", &self.api_key)
            .send()
            .await
            .context("bucket listing failed to send")?
            .error_for_status()
            .context("bucket listing rejected")?
            .json()
            .await
            .context("invalid bucket listing payload")
    }

    async fn create_bucket(&self, name: &str, public: bool, file_size_limit: u64) -> Result<()> {
        self.http
            .post(format!("{}/storage/v1/bucket", self.api_url))
            .header("apikey", &self.api_key)
            .json(&CreateBucketRequest {
                name: name.to_string(),
                public,
                file_size_limit,
            })
            .send()
            .await
            .context("bucket creation failed to send")?
            .error_for_status()
            .context("bucket creation rejected")?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>> {
        self.http
            .post(format!("{}/storage/v1/object/list/{bucket}", self.api_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "prefix": "", "limit": 1000 }))
            .send()
            .await
            .context("object listing failed to send")?
            .error_for_status()
            .context("object listing rejected")?
            .json()
            .await
            .context("invalid object listing payload")
    }

    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
        access_token: &str,
    ) -> Result<()> {
        self.http
            .post(format!("{}/storage/v1/object/{bucket}/{name}", self.api_url))
            .header("apikey", &self.api_key)
            .header("content-type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .bearer_auth(access_token)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("upload of '{name}' failed to send"))?
            .error_for_status()
            .with_context(|| format!("upload of '{name}' rejected"))?;
        Ok(())
    }

    async fn remove_objects(
        &self,
        bucket: &str,
        names: &[String],
        access_token: &str,
    ) -> Result<()> {
        self.http
            .delete(format!("{}/storage/v1/object/{bucket}", self.api_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .json(&RemoveObjectsRequest {
                prefixes: names.to_vec(),
            })
            .send()
            .await
            .context("object removal failed to send")?
            .error_for_status()
            .context("object removal rejected")?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{name}", self.api_url)
    }

    async fn download_public(&self, bucket: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .http
            .get(self.public_url(bucket, name))
            .header("apikey", &self.api_key)
            .send()
            .await
            .with_context(|| format!("download of '{name}' failed to send"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = response
            .error_for_status()
            .with_context(|| format!("download of '{name}' rejected"))?
            .bytes()
            .await
            .with_context(|| format!("download of '{name}' failed mid-body"))?;
        Ok(Some(bytes.to_vec()))
    }
}
