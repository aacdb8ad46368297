use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use shared::{
    domain::{Session, SlotIndex, GRID_SLOT_COUNT},
    error::GridError,
    protocol::{BucketSummary, ObjectSummary},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::info;

pub mod config;
pub mod identity;
pub mod logbuf;
pub mod rest;
pub mod store;
pub mod transform;

pub use config::{load_settings, load_settings_from, Settings};
pub use identity::{AuthOutcome, SessionEvent, SessionManager};
pub use logbuf::{LogBuffer, LogEvent};
pub use store::SlotStore;
pub use transform::{square_crop_jpeg, TransformedImage};

/// Auth events pushed by the identity provider for the process lifetime.
#[derive(Debug, Clone)]
pub enum AuthChange {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

/// External collaborator: email/password identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// One-shot check for a previously persisted session.
    async fn restore_session(&self) -> Result<Option<Session>>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;
    async fn sign_out(&self, access_token: &str) -> Result<()>;
    /// Provider-pushed auth events: sign-in, sign-out, token refresh.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

/// External collaborator: bucket-based blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>>;
    async fn create_bucket(&self, name: &str, public: bool, file_size_limit: u64) -> Result<()>;
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>>;
    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
        access_token: &str,
    ) -> Result<()>;
    async fn remove_objects(&self, bucket: &str, names: &[String], access_token: &str)
        -> Result<()>;
    fn public_url(&self, bucket: &str, name: &str) -> String;
    /// Fetch an object through its public URL; `None` when it does not exist.
    async fn download_public(&self, bucket: &str, name: &str) -> Result<Option<Vec<u8>>>;
}

pub struct MissingIdentityProvider {
    events: broadcast::Sender<AuthChange>,
}

impl Default for MissingIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MissingIdentityProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(8);
        Self { events }
    }
}

#[async_trait]
impl IdentityProvider for MissingIdentityProvider {
    async fn restore_session(&self) -> Result<Option<Session>> {
        Err(anyhow!("identity backend unavailable"))
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<Session> {
        Err(anyhow!("identity backend unavailable for {email}"))
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<Session> {
        Err(anyhow!("identity backend unavailable for {email}"))
    }

    async fn sign_out(&self, _access_token: &str) -> Result<()> {
        Err(anyhow!("identity backend unavailable"))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

pub struct MissingObjectStore;

#[async_trait]
impl ObjectStore for MissingObjectStore {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        Err(anyhow!("object storage unavailable"))
    }

    async fn create_bucket(&self, name: &str, _public: bool, _file_size_limit: u64) -> Result<()> {
        Err(anyhow!("object storage unavailable for bucket {name}"))
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>> {
        Err(anyhow!("object storage unavailable for bucket {bucket}"))
    }

    async fn upload_object(
        &self,
        bucket: &str,
        _name: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
        _upsert: bool,
        _access_token: &str,
    ) -> Result<()> {
        Err(anyhow!("object storage unavailable for bucket {bucket}"))
    }

    async fn remove_objects(
        &self,
        bucket: &str,
        _names: &[String],
        _access_token: &str,
    ) -> Result<()> {
        Err(anyhow!("object storage unavailable for bucket {bucket}"))
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("missing://{bucket}/{name}")
    }

    async fn download_public(&self, bucket: &str, _name: &str) -> Result<Option<Vec<u8>>> {
        Err(anyhow!("object storage unavailable for bucket {bucket}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridPhase {
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct GridSnapshot {
    pub phase: GridPhase,
    pub slots: [Option<String>; GRID_SLOT_COUNT],
    pub description: String,
    /// Latest user-facing failure banner; cleared on the next load.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum GridEvent {
    Changed,
}

struct GridState {
    phase: GridPhase,
    slots: [Option<String>; GRID_SLOT_COUNT],
    description: String,
    last_error: Option<String>,
    // Per-slot revision counters; a remote listing only overwrites slots
    // whose revision is unchanged since the listing began, so a slow load
    // cannot clobber a mutation the user made meanwhile.
    slot_revisions: [u64; GRID_SLOT_COUNT],
    next_revision: u64,
}

impl GridState {
    fn new() -> Self {
        Self {
            phase: GridPhase::Loading,
            slots: Default::default(),
            description: String::new(),
            last_error: None,
            slot_revisions: [0; GRID_SLOT_COUNT],
            next_revision: 1,
        }
    }

    fn touch_slot(&mut self, slot: SlotIndex, value: Option<String>) {
        self.slot_revisions[slot.as_usize()] = self.next_revision;
        self.next_revision += 1;
        self.slots[slot.as_usize()] = value;
    }
}

/// View-model for the nine wall slots.
///
/// Loads initial state from the remote store, applies optimistic local
/// updates on upload/remove, and re-syncs when a session appears. The
/// in-memory slot array is the single source of truth; every mutation is a
/// read-modify-write against the latest copy.
pub struct GridController {
    store: Arc<SlotStore>,
    session: Arc<SessionManager>,
    log: LogBuffer,
    inner: Mutex<GridState>,
    events: broadcast::Sender<GridEvent>,
    resync_task: Mutex<Option<JoinHandle<()>>>,
}

impl GridController {
    pub fn new(store: Arc<SlotStore>, session: Arc<SessionManager>, log: LogBuffer) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            store,
            session,
            log,
            inner: Mutex::new(GridState::new()),
            events,
            resync_task: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GridEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> GridSnapshot {
        let state = self.inner.lock().await;
        GridSnapshot {
            phase: state.phase.clone(),
            slots: state.slots.clone(),
            description: state.description.clone(),
            last_error: state.last_error.clone(),
        }
    }

    fn emit_changed(&self) {
        let _ = self.events.send(GridEvent::Changed);
    }

    async fn report(&self, context: &str, err: &GridError) {
        self.log.error(
            format!("{context} failed"),
            Some(json!({ "code": err.code(), "detail": err.detail() })),
        );
        {
            let mut state = self.inner.lock().await;
            state.last_error = Some(err.to_string());
        }
        self.emit_changed();
    }

    /// Load remote state into the nine slots.
    ///
    /// Runs at startup, on explicit retry, and whenever the session goes
    /// absent -> present. Container failure lands in `GridPhase::Error` with
    /// a retry affordance; a listing failure after a healthy container
    /// surfaces through the log sink and yields an empty wall.
    pub async fn load(&self) {
        {
            let mut state = self.inner.lock().await;
            state.phase = GridPhase::Loading;
            state.last_error = None;
        }
        self.emit_changed();

        if let Err(err) = self.store.ensure_bucket().await {
            {
                let mut state = self.inner.lock().await;
                state.phase = GridPhase::Error(err.to_string());
            }
            self.emit_changed();
            return;
        }

        let revision_floor = { self.inner.lock().await.slot_revisions };
        let mapping = self.store.list_slot_images().await;
        let description = self.store.load_description().await;

        {
            let mut state = self.inner.lock().await;
            for slot in SlotIndex::all() {
                if state.slot_revisions[slot.as_usize()] != revision_floor[slot.as_usize()] {
                    // mutated locally while the listing was in flight
                    continue;
                }
                state.slots[slot.as_usize()] = mapping.get(&slot).cloned();
            }
            if state.description.is_empty() {
                if let Some(description) = description {
                    state.description = description;
                }
            }
            state.phase = GridPhase::Ready;
        }
        info!(populated = mapping.len(), "wall loaded");
        self.emit_changed();
    }

    /// Upload raw image bytes into `slot`.
    ///
    /// The image is square-cropped first; a decode failure leaves the slot
    /// unmodified. A storage failure keeps whatever the slot last showed and
    /// raises the error banner instead.
    pub async fn upload(&self, slot: SlotIndex, bytes: Vec<u8>) -> Result<String, GridError> {
        if let Err(err) = self.session.access_token().await {
            self.report("upload", &err).await;
            return Err(err);
        }
        let transformed = match transform::square_crop_jpeg(&bytes) {
            Ok(transformed) => transformed,
            Err(err) => {
                self.report("upload", &err).await;
                return Err(err);
            }
        };
        match self
            .store
            .put_image(slot, transformed.bytes, transformed.content_type)
            .await
        {
            Ok(url) => {
                {
                    let mut state = self.inner.lock().await;
                    state.touch_slot(slot, Some(url.clone()));
                    state.last_error = None;
                }
                self.log
                    .success(format!("slot {slot} updated"), Some(json!({ "url": url })));
                self.emit_changed();
                Ok(url)
            }
            Err(err) => {
                self.report("upload", &err).await;
                Err(err)
            }
        }
    }

    pub async fn remove(&self, slot: SlotIndex) -> Result<(), GridError> {
        if let Err(err) = self.session.access_token().await {
            self.report("remove", &err).await;
            return Err(err);
        }
        match self.store.delete_slot(slot).await {
            Ok(()) => {
                {
                    let mut state = self.inner.lock().await;
                    state.touch_slot(slot, None);
                    state.last_error = None;
                }
                self.log.success(format!("slot {slot} cleared"), None);
                self.emit_changed();
                Ok(())
            }
            Err(err) => {
                self.report("remove", &err).await;
                Err(err)
            }
        }
    }

    /// Clear every slot. Slots already emptied stay cleared even when a later
    /// slot's delete fails mid-sweep.
    pub async fn reset(&self) -> Result<(), GridError> {
        if let Err(err) = self.session.access_token().await {
            self.report("reset", &err).await;
            return Err(err);
        }
        for slot in SlotIndex::all() {
            match self.store.delete_slot(slot).await {
                Ok(()) => {
                    let mut state = self.inner.lock().await;
                    state.touch_slot(slot, None);
                }
                Err(err) => {
                    self.report("reset", &err).await;
                    return Err(err);
                }
            }
        }
        self.log.success("wall reset", None);
        self.emit_changed();
        Ok(())
    }

    pub async fn set_description(&self, text: impl Into<String>) {
        {
            let mut state = self.inner.lock().await;
            state.description = text.into();
        }
        self.emit_changed();
    }

    /// Persist the wall description.
    pub async fn save(&self) -> Result<(), GridError> {
        if let Err(err) = self.session.access_token().await {
            self.report("save", &err).await;
            return Err(err);
        }
        let description = { self.inner.lock().await.description.clone() };
        match self.store.save_description(&description).await {
            Ok(()) => {
                self.log.success("wall description saved", None);
                self.emit_changed();
                Ok(())
            }
            Err(err) => {
                self.report("save", &err).await;
                Err(err)
            }
        }
    }

    /// Re-load the wall whenever the session transitions absent -> present.
    ///
    /// Sign-out deliberately does not clear displayed images; they are
    /// public-read.
    pub async fn attach_session_resync(self: &Arc<Self>) {
        let mut changes = self.session.subscribe();
        let mut was_present = self.session.principal().await.is_some();
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(SessionEvent::Changed(principal)) => {
                        let present = principal.is_some();
                        if present && !was_present {
                            controller.load().await;
                        }
                        was_present = present;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // presence flag may be stale; refresh it
                        was_present = controller.session.principal().await.is_some();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        let previous = { self.resync_task.lock().await.replace(task) };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.resync_task.lock().await.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests;
