use std::sync::atomic::Ordering;

use shared::{
    domain::{LogLevel, SlotIndex},
    error::GridError,
};

use super::{harness, signed_in_harness};
use crate::store::{object_name, parse_object_name, BUCKET_NAME};
use crate::ObjectStore;

fn slot(n: u8) -> SlotIndex {
    SlotIndex::new(n).expect("valid slot")
}

#[test]
fn object_names_round_trip() {
    let name = object_name(slot(4), 1_700_000_123_456, "jpg");
    assert_eq!(name, "slot-4-1700000123456.jpg");
    assert_eq!(parse_object_name(&name), Some((slot(4), 1_700_000_123_456)));
}

#[test]
fn foreign_object_names_are_ignored() {
    assert_eq!(parse_object_name("grid-meta.json"), None);
    assert_eq!(parse_object_name("slot-12-100.jpg"), None);
    assert_eq!(parse_object_name("slot-x-100.jpg"), None);
    assert_eq!(parse_object_name("slot-3.jpg"), None);
    assert_eq!(parse_object_name("slot-3-notatime.jpg"), None);
}

#[tokio::test]
async fn newest_timestamp_wins_per_slot() {
    let h = harness().await;
    h.store.insert_object(BUCKET_NAME, "slot-0-200.jpg", vec![2]);
    h.store.insert_object(BUCKET_NAME, "slot-0-100.jpg", vec![1]);
    h.store.insert_object(BUCKET_NAME, "slot-7-50.png", vec![3]);

    let mapping = h.slots.list_slot_images().await;
    assert_eq!(mapping.len(), 2);
    assert_eq!(
        mapping.get(&slot(0)).map(String::as_str),
        Some("fake://photo-wall/slot-0-200.jpg")
    );
    assert_eq!(
        mapping.get(&slot(7)).map(String::as_str),
        Some("fake://photo-wall/slot-7-50.png")
    );
}

#[tokio::test]
async fn listing_failure_yields_empty_mapping_and_logs() {
    let h = harness().await;
    h.store.fail_object_listing.store(true, Ordering::SeqCst);

    let mapping = h.slots.list_slot_images().await;
    assert!(mapping.is_empty());
    assert!(h
        .log
        .snapshot()
        .iter()
        .any(|entry| entry.level == LogLevel::Error));
}

#[tokio::test]
async fn put_image_requires_a_session() {
    let h = harness().await;
    let err = h
        .slots
        .put_image(slot(2), vec![1, 2, 3], "image/jpeg")
        .await
        .expect_err("must require auth");
    assert!(matches!(err, GridError::AuthRequired));
    assert_eq!(h.store.object_count(BUCKET_NAME), 0);
}

#[tokio::test]
async fn put_image_stores_under_a_timestamped_name() {
    let h = signed_in_harness().await;
    let url = h
        .slots
        .put_image(slot(3), vec![9, 9, 9], "image/jpeg")
        .await
        .expect("upload");

    let names = h.store.object_names(BUCKET_NAME);
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("slot-3-"));
    assert!(names[0].ends_with(".jpg"));
    assert_eq!(url, format!("fake://photo-wall/{}", names[0]));
}

#[tokio::test]
async fn repeat_uploads_never_collide_on_names() {
    let h = signed_in_harness().await;
    let first = h
        .slots
        .put_image(slot(5), vec![1], "image/jpeg")
        .await
        .expect("first upload");
    let second = h
        .slots
        .put_image(slot(5), vec![2], "image/jpeg")
        .await
        .expect("second upload");

    assert_ne!(first, second);
    assert_eq!(h.store.object_count(BUCKET_NAME), 2);

    // the listing resolves the duplicate in favor of the newer upload
    let mapping = h.slots.list_slot_images().await;
    assert_eq!(mapping.get(&slot(5)), Some(&second));
}

#[tokio::test]
async fn bucket_check_is_cached_after_success() {
    let h = signed_in_harness().await;
    h.slots.ensure_bucket().await.expect("first check");
    h.slots.ensure_bucket().await.expect("second check");
    assert_eq!(h.store.list_bucket_calls.load(Ordering::SeqCst), 1);

    let buckets = h.store.list_buckets().await.expect("buckets");
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].name, BUCKET_NAME);
    assert!(buckets[0].public);
}

#[tokio::test]
async fn bucket_creation_covers_a_listing_outage() {
    let h = harness().await;
    h.store.fail_bucket_listing.store(true, Ordering::SeqCst);
    h.slots.ensure_bucket().await.expect("create despite listing outage");
    let names = h.store.list_buckets().await; // listing still failing
    assert!(names.is_err());
}

#[tokio::test]
async fn bucket_setup_failure_is_storage_unavailable() {
    let h = harness().await;
    h.store.fail_bucket_listing.store(true, Ordering::SeqCst);
    h.store.fail_bucket_creation.store(true, Ordering::SeqCst);

    let err = h.slots.ensure_bucket().await.expect_err("both paths down");
    assert!(matches!(err, GridError::StorageUnavailable(_)));
    assert!(err.detail().contains("list:"));
    assert!(err.detail().contains("create:"));
}

#[tokio::test]
async fn delete_slot_sweeps_every_object_for_the_slot() {
    let h = signed_in_harness().await;
    h.store.insert_object(BUCKET_NAME, "slot-1-100.jpg", vec![1]);
    h.store.insert_object(BUCKET_NAME, "slot-1-200.jpg", vec![2]);
    h.store.insert_object(BUCKET_NAME, "slot-2-100.jpg", vec![3]);

    h.slots.delete_slot(slot(1)).await.expect("delete");

    let names = h.store.object_names(BUCKET_NAME);
    assert_eq!(names, vec!["slot-2-100.jpg".to_string()]);
}

#[tokio::test]
async fn deleting_an_empty_slot_is_a_no_op() {
    let h = signed_in_harness().await;
    h.slots.delete_slot(slot(8)).await.expect("no-op delete");
}

#[tokio::test]
async fn missing_object_store_surfaces_as_storage_unavailable() {
    let identity = std::sync::Arc::new(super::FakeIdentityProvider::new());
    let log = crate::LogBuffer::new();
    let session = crate::SessionManager::new(identity, log.clone());
    session.initialize().await;
    let slots = crate::SlotStore::new(
        std::sync::Arc::new(crate::MissingObjectStore),
        session,
        log,
    );

    let err = slots.ensure_bucket().await.expect_err("no backend");
    assert!(matches!(err, GridError::StorageUnavailable(_)));
    assert!(slots.list_slot_images().await.is_empty());
}

#[tokio::test]
async fn description_round_trips_through_the_store() {
    let h = signed_in_harness().await;
    assert_eq!(h.slots.load_description().await, None);

    h.slots
        .save_description("vacation wall")
        .await
        .expect("save description");
    assert_eq!(
        h.slots.load_description().await.as_deref(),
        Some("vacation wall")
    );

    // saving again upserts rather than failing on the existing object
    h.slots
        .save_description("updated")
        .await
        .expect("second save");
    assert_eq!(h.slots.load_description().await.as_deref(), Some("updated"));
}
