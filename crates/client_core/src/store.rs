//! Remote grid store adapter: maps the nine slot positions onto object
//! names in the shared bucket.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc,
    },
};

use chrono::Utc;
use serde_json::json;
use shared::{domain::SlotIndex, error::GridError};
use tracing::info;

use crate::{identity::SessionManager, transform, LogBuffer, ObjectStore};

pub const BUCKET_NAME: &str = "photo-wall";
/// Bucket-level cap on individual object size.
pub const BUCKET_FILE_SIZE_LIMIT: u64 = 5 * 1024 * 1024;
const DESCRIPTION_OBJECT: &str = "grid-meta.json";

/// Object name carrying the owning slot and a creation timestamp, so slot
/// assignment can be recovered from a flat, unordered listing.
pub fn object_name(slot: SlotIndex, timestamp_ms: i64, extension: &str) -> String {
    format!("slot-{slot}-{timestamp_ms}.{extension}")
}

/// Parse `slot-{n}-{epoch_ms}.{ext}`; foreign names yield `None`.
pub fn parse_object_name(name: &str) -> Option<(SlotIndex, i64)> {
    let rest = name.strip_prefix("slot-")?;
    let (slot_raw, rest) = rest.split_once('-')?;
    let slot = SlotIndex::new(slot_raw.parse().ok()?)?;
    let timestamp_raw = rest.split('.').next()?;
    let timestamp = timestamp_raw.parse().ok()?;
    Some((slot, timestamp))
}

/// Adapter over the blob store for the fixed nine-slot wall.
pub struct SlotStore {
    store: Arc<dyn ObjectStore>,
    session: Arc<SessionManager>,
    log: LogBuffer,
    // bucket existence is checked at most once per process
    bucket_ready: AtomicBool,
    // strictly increasing so two uploads can never collide on a name
    last_timestamp: AtomicI64,
}

impl SlotStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        session: Arc<SessionManager>,
        log: LogBuffer,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            session,
            log,
            bucket_ready: AtomicBool::new(false),
            last_timestamp: AtomicI64::new(0),
        })
    }

    fn fresh_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_timestamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_timestamp.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Idempotent bucket check; success is cached for the process lifetime.
    pub async fn ensure_bucket(&self) -> Result<(), GridError> {
        if self.bucket_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        match self.store.list_buckets().await {
            Ok(buckets) => {
                if !buckets.iter().any(|bucket| bucket.name == BUCKET_NAME) {
                    self.store
                        .create_bucket(BUCKET_NAME, true, BUCKET_FILE_SIZE_LIMIT)
                        .await
                        .map_err(|err| {
                            let err = GridError::StorageUnavailable(format!("{err:#}"));
                            self.log.error(
                                "bucket creation failed",
                                Some(json!({ "bucket": BUCKET_NAME, "detail": err.detail() })),
                            );
                            err
                        })?;
                    self.log
                        .success("storage bucket created", Some(json!({ "bucket": BUCKET_NAME })));
                }
            }
            Err(list_err) => {
                // listing is down; creation is the only remaining path
                if let Err(create_err) = self
                    .store
                    .create_bucket(BUCKET_NAME, true, BUCKET_FILE_SIZE_LIMIT)
                    .await
                {
                    let err = GridError::StorageUnavailable(format!(
                        "list: {list_err:#}; create: {create_err:#}"
                    ));
                    self.log.error(
                        "storage unreachable",
                        Some(json!({ "bucket": BUCKET_NAME, "detail": err.detail() })),
                    );
                    return Err(err);
                }
            }
        }
        self.bucket_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Current slot -> public URL mapping recovered from the flat listing.
    ///
    /// Never fails: a listing error is logged and reported as an empty map.
    /// When several objects exist for one slot the highest embedded
    /// timestamp wins; the order the service lists objects in is
    /// unspecified and must not matter.
    pub async fn list_slot_images(&self) -> HashMap<SlotIndex, String> {
        let objects = match self.store.list_objects(BUCKET_NAME).await {
            Ok(objects) => objects,
            Err(err) => {
                self.log.error(
                    "listing wall images failed",
                    Some(json!({ "bucket": BUCKET_NAME, "detail": format!("{err:#}") })),
                );
                return HashMap::new();
            }
        };

        let mut newest: HashMap<SlotIndex, i64> = HashMap::new();
        let mut urls: HashMap<SlotIndex, String> = HashMap::new();
        for object in objects {
            let Some((slot, timestamp)) = parse_object_name(&object.name) else {
                continue;
            };
            if newest.get(&slot).is_some_and(|&seen| seen >= timestamp) {
                continue;
            }
            newest.insert(slot, timestamp);
            urls.insert(slot, self.store.public_url(BUCKET_NAME, &object.name));
        }
        urls
    }

    /// Store image bytes for `slot` under a fresh timestamped name and
    /// return the public URL.
    ///
    /// A prior object for the slot is never overwritten here; stale objects
    /// accumulate until an explicit delete sweeps the slot prefix.
    pub async fn put_image(
        &self,
        slot: SlotIndex,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, GridError> {
        let token = self.session.access_token().await?;
        self.ensure_bucket().await?;
        let name = object_name(
            slot,
            self.fresh_timestamp(),
            transform::extension_for(content_type),
        );
        self.store
            .upload_object(BUCKET_NAME, &name, bytes, content_type, false, &token)
            .await
            .map_err(|err| {
                let err = GridError::StorageUnavailable(format!("{err:#}"));
                self.log.error(
                    "image upload failed",
                    Some(json!({ "slot": slot.get(), "name": name, "detail": err.detail() })),
                );
                err
            })?;
        info!(slot = slot.get(), name = %name, "stored wall image");
        Ok(self.store.public_url(BUCKET_NAME, &name))
    }

    /// Remove every stored object belonging to `slot`; success when none
    /// exist. This full-prefix sweep is what bounds duplicate accumulation.
    pub async fn delete_slot(&self, slot: SlotIndex) -> Result<(), GridError> {
        let token = self.session.access_token().await?;
        let prefix = format!("slot-{slot}-");
        let objects = self
            .store
            .list_objects(BUCKET_NAME)
            .await
            .map_err(|err| {
                let err = GridError::StorageUnavailable(format!("{err:#}"));
                self.log.error(
                    "listing before delete failed",
                    Some(json!({ "slot": slot.get(), "detail": err.detail() })),
                );
                err
            })?;
        let names: Vec<String> = objects
            .into_iter()
            .map(|object| object.name)
            .filter(|name| name.starts_with(&prefix))
            .collect();
        if names.is_empty() {
            return Ok(());
        }
        self.store
            .remove_objects(BUCKET_NAME, &names, &token)
            .await
            .map_err(|err| {
                let err = GridError::StorageUnavailable(format!("{err:#}"));
                self.log.error(
                    "slot delete failed",
                    Some(json!({ "slot": slot.get(), "detail": err.detail() })),
                );
                err
            })?;
        info!(slot = slot.get(), removed = names.len(), "cleared wall slot");
        Ok(())
    }

    /// Persist the wall description as a small upserted JSON object.
    pub async fn save_description(&self, text: &str) -> Result<(), GridError> {
        let token = self.session.access_token().await?;
        self.ensure_bucket().await?;
        let body =
            serde_json::to_vec(&json!({ "description": text })).map_err(GridError::unknown)?;
        self.store
            .upload_object(
                BUCKET_NAME,
                DESCRIPTION_OBJECT,
                body,
                "application/json",
                true,
                &token,
            )
            .await
            .map_err(|err| {
                let err = GridError::StorageUnavailable(format!("{err:#}"));
                self.log.error(
                    "saving wall description failed",
                    Some(json!({ "detail": err.detail() })),
                );
                err
            })
    }

    /// Best-effort read of the persisted description; absent or unreadable
    /// yields `None`.
    pub async fn load_description(&self) -> Option<String> {
        let bytes = match self.store.download_public(BUCKET_NAME, DESCRIPTION_OBJECT).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                self.log.warning(
                    "wall description fetch failed",
                    Some(json!({ "detail": format!("{err:#}") })),
                );
                return None;
            }
        };
        serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()?
            .get("description")?
            .as_str()
            .map(str::to_string)
    }
}
