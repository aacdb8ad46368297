use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{Principal, Session},
    protocol::{BucketSummary, ObjectSummary},
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    AuthChange, GridController, IdentityProvider, LogBuffer, ObjectStore, SessionManager,
    SlotStore,
};

mod config_tests;
mod identity_tests;
mod store_tests;

/// In-memory identity service with stable per-email principal ids.
pub struct FakeIdentityProvider {
    events: broadcast::Sender<AuthChange>,
    // email -> (password, user_id)
    accounts: Mutex<HashMap<String, (String, String)>>,
    persisted: Mutex<Option<Session>>,
    token_counter: AtomicU64,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            events,
            accounts: Mutex::new(HashMap::new()),
            persisted: Mutex::new(None),
            token_counter: AtomicU64::new(0),
        }
    }

    fn session_for(&self, email: &str, user_id: &str) -> Session {
        let n = self.token_counter.fetch_add(1, Ordering::SeqCst);
        Session {
            access_token: format!("access-{user_id}-{n}"),
            refresh_token: format!("refresh-{n}"),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user: Principal {
                user_id: user_id.to_string(),
                email: email.to_string(),
            },
        }
    }

    pub fn set_persisted(&self, session: Option<Session>) {
        *self.persisted.lock().expect("persisted lock") = session;
    }

    pub fn emit(&self, change: AuthChange) {
        let _ = self.events.send(change);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn restore_session(&self) -> Result<Option<Session>> {
        Ok(self.persisted.lock().expect("persisted lock").clone())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        let mut accounts = self.accounts.lock().expect("accounts lock");
        if accounts.contains_key(email) {
            return Err(anyhow!("email already registered: {email}"));
        }
        let user_id = Uuid::new_v4().to_string();
        accounts.insert(email.to_string(), (password.to_string(), user_id.clone()));
        drop(accounts);
        let session = self.session_for(email, &user_id);
        let _ = self.events.send(AuthChange::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let user_id = {
            let accounts = self.accounts.lock().expect("accounts lock");
            match accounts.get(email) {
                Some((stored, user_id)) if stored == password => user_id.clone(),
                _ => return Err(anyhow!("invalid credentials")),
            }
        };
        let session = self.session_for(email, &user_id);
        let _ = self.events.send(AuthChange::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, _access_token: &str) -> Result<()> {
        let _ = self.events.send(AuthChange::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

/// In-memory blob store with switchable failure modes.
pub struct FakeObjectStore {
    buckets: Mutex<Vec<BucketSummary>>,
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    pub list_bucket_calls: AtomicUsize,
    pub fail_bucket_listing: AtomicBool,
    pub fail_bucket_creation: AtomicBool,
    pub fail_object_listing: AtomicBool,
    pub fail_uploads: AtomicBool,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(Vec::new()),
            objects: Mutex::new(BTreeMap::new()),
            list_bucket_calls: AtomicUsize::new(0),
            fail_bucket_listing: AtomicBool::new(false),
            fail_bucket_creation: AtomicBool::new(false),
            fail_object_listing: AtomicBool::new(false),
            fail_uploads: AtomicBool::new(false),
        }
    }

    pub fn insert_object(&self, bucket: &str, name: &str, bytes: Vec<u8>) {
        self.objects
            .lock()
            .expect("objects lock")
            .insert((bucket.to_string(), name.to_string()), bytes);
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("objects lock")
            .get(&(bucket.to_string(), name.to_string()))
            .cloned()
    }

    pub fn object_names(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .expect("objects lock")
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.object_names(bucket).len()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        self.list_bucket_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bucket_listing.load(Ordering::SeqCst) {
            return Err(anyhow!("bucket listing offline"));
        }
        Ok(self.buckets.lock().expect("buckets lock").clone())
    }

    async fn create_bucket(&self, name: &str, public: bool, _file_size_limit: u64) -> Result<()> {
        if self.fail_bucket_creation.load(Ordering::SeqCst) {
            return Err(anyhow!("bucket creation offline"));
        }
        self.buckets.lock().expect("buckets lock").push(BucketSummary {
            id: name.to_string(),
            name: name.to_string(),
            public,
        });
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>> {
        if self.fail_object_listing.load(Ordering::SeqCst) {
            return Err(anyhow!("object listing offline"));
        }
        Ok(self
            .object_names(bucket)
            .into_iter()
            .map(|name| ObjectSummary { name })
            .collect())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
        upsert: bool,
        access_token: &str,
    ) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(anyhow!("uploads offline"));
        }
        if access_token.is_empty() {
            return Err(anyhow!("missing bearer token"));
        }
        let mut objects = self.objects.lock().expect("objects lock");
        let key = (bucket.to_string(), name.to_string());
        if !upsert && objects.contains_key(&key) {
            return Err(anyhow!("duplicate object name: {name}"));
        }
        objects.insert(key, bytes);
        Ok(())
    }

    async fn remove_objects(
        &self,
        bucket: &str,
        names: &[String],
        access_token: &str,
    ) -> Result<()> {
        if access_token.is_empty() {
            return Err(anyhow!("missing bearer token"));
        }
        let mut objects = self.objects.lock().expect("objects lock");
        for name in names {
            objects.remove(&(bucket.to_string(), name.clone()));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("fake://{bucket}/{name}")
    }

    async fn download_public(&self, bucket: &str, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.object(bucket, name))
    }
}

pub struct TestHarness {
    pub identity: Arc<FakeIdentityProvider>,
    pub store: Arc<FakeObjectStore>,
    pub session: Arc<SessionManager>,
    pub slots: Arc<SlotStore>,
    pub grid: Arc<GridController>,
    pub log: LogBuffer,
}

pub async fn harness() -> TestHarness {
    let identity = Arc::new(FakeIdentityProvider::new());
    let store = Arc::new(FakeObjectStore::new());
    let log = LogBuffer::new();
    let session = SessionManager::new(
        Arc::clone(&identity) as Arc<dyn IdentityProvider>,
        log.clone(),
    );
    session.initialize().await;
    let slots = SlotStore::new(
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::clone(&session),
        log.clone(),
    );
    let grid = GridController::new(Arc::clone(&slots), Arc::clone(&session), log.clone());
    TestHarness {
        identity,
        store,
        session,
        slots,
        grid,
        log,
    }
}

pub async fn signed_in_harness() -> TestHarness {
    let harness = harness().await;
    let outcome = harness.session.sign_up("alice@example.com", "hunter2").await;
    assert!(outcome.success, "test sign-up failed: {:?}", outcome.error);
    harness
}

/// PNG-encoded solid-color test image.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encode");
    out.into_inner()
}
