//! End-to-end replication tests against the in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use sqr_core::{Document, EntityKind, MemoryPrimary, MemoryRelational, RetryPolicy};
use sqr_sync::{ServiceMode, SyncService, SyncServiceBuilder};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn user_doc(id: &str) -> Document {
    let now = sqr_core::now_millis();
    Document::new(id)
        .with("email", format!("{}@example.com", id))
        .with("name", format!("user {}", id))
        .with("created_at", now)
        .with("updated_at", now)
}

fn artifact_doc(id: &str, user_id: &str, is_active: bool) -> Document {
    let now = sqr_core::now_millis();
    Document::new(id)
        .with("user_id", user_id)
        .with("title", format!("qr {}", id))
        .with("content", "https://example.com/q/1")
        .with("is_active", is_active)
        .with("created_at", now)
        .with("updated_at", now)
}

fn scan_doc(id: &str, artifact_id: &str) -> Document {
    let now = sqr_core::now_millis();
    Document::new(id)
        .with("artifact_id", artifact_id)
        .with("scanned_at", now)
        .with("created_at", now)
        .with("updated_at", now)
}

async fn started_service(
    primary: &Arc<MemoryPrimary>,
    secondary: &Arc<MemoryRelational>,
) -> SyncService {
    init_logs();
    let mut service = SyncServiceBuilder::new()
        .with_primary(primary.clone())
        .with_secondary(secondary.clone())
        .with_retry_policy(RetryPolicy::no_retry())
        .with_resubscribe_policy(RetryPolicy::new(u32::MAX, 20, 100, 2.0))
        .build()
        .unwrap();
    assert_eq!(service.start().await.unwrap(), ServiceMode::Full);
    // Give the listeners a moment to attach their feeds.
    tokio::time::sleep(Duration::from_millis(30)).await;
    service
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn initial_bulk_load_copies_existing_data_in_order() {
    let primary = Arc::new(MemoryPrimary::new());
    let secondary = Arc::new(MemoryRelational::new());

    for i in 0..3 {
        primary.insert_document(EntityKind::User, user_doc(&format!("u{}", i)));
    }
    for i in 0..5 {
        primary.insert_document(
            EntityKind::EncodedArtifact,
            artifact_doc(&format!("q{}", i), &format!("u{}", i % 3), true),
        );
    }
    for i in 0..10 {
        primary.insert_document(
            EntityKind::ScanEvent,
            scan_doc(&format!("s{}", i), &format!("q{}", i % 5)),
        );
    }

    let mut service = started_service(&primary, &secondary).await;

    let summaries = service.initial_load_summary().unwrap();
    let kinds: Vec<EntityKind> = summaries.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, EntityKind::DEPENDENCY_ORDER.to_vec());

    let by_kind = |k: EntityKind| summaries.iter().find(|s| s.kind == k).unwrap();
    assert_eq!(by_kind(EntityKind::User).synced_records, 3);
    assert_eq!(by_kind(EntityKind::EncodedArtifact).synced_records, 5);
    assert_eq!(by_kind(EntityKind::ScanEvent).synced_records, 10);
    assert!(summaries.iter().all(|s| s.errors == 0));

    assert_eq!(secondary.row_count(EntityKind::User), 3);
    assert_eq!(secondary.row_count(EntityKind::EncodedArtifact), 5);
    assert_eq!(secondary.row_count(EntityKind::ScanEvent), 10);

    // The load recorded a watermark, so the service is past first-run state.
    assert!(service.status().last_batch_sync.is_some());

    service.stop().await;
}

#[tokio::test]
async fn realtime_changes_flow_through_to_the_replica() {
    let primary = Arc::new(MemoryPrimary::new());
    let secondary = Arc::new(MemoryRelational::new());
    let mut service = started_service(&primary, &secondary).await;

    primary.insert_document(EntityKind::User, user_doc("u1"));
    wait_for(|| secondary.row_count(EntityKind::User) == 1).await;

    let row = secondary.row_for_source(EntityKind::User, "u1").unwrap();
    assert_eq!(row.get("email").unwrap().as_text(), Some("u1@example.com"));

    // Two rapid updates: FIFO means the last-enqueued state wins.
    primary.insert_document(EntityKind::EncodedArtifact, artifact_doc("q1", "u1", true));
    wait_for(|| secondary.row_count(EntityKind::EncodedArtifact) == 1).await;

    primary.update_document(EntityKind::EncodedArtifact, artifact_doc("q1", "u1", true));
    primary.update_document(EntityKind::EncodedArtifact, artifact_doc("q1", "u1", false));
    wait_for(|| {
        secondary
            .row_for_source(EntityKind::EncodedArtifact, "q1")
            .and_then(|r| r.get("is_active").map(|v| v.as_bool() == Some(false)))
            .unwrap_or(false)
    })
    .await;

    // Delete, then delete again: the second pass must be a no-op.
    primary.delete_document(EntityKind::EncodedArtifact, "q1");
    wait_for(|| secondary.row_count(EntityKind::EncodedArtifact) == 0).await;
    primary.delete_document(EntityKind::EncodedArtifact, "q1");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(secondary.row_count(EntityKind::EncodedArtifact), 0);

    service.stop().await;
}

#[tokio::test]
async fn child_ahead_of_parent_heals_on_reconciliation() {
    let primary = Arc::new(MemoryPrimary::new());
    let secondary = Arc::new(MemoryRelational::new());
    let mut service = started_service(&primary, &secondary).await;

    // The scan arrives before its artifact (and the artifact's owner)
    // exist anywhere. The real-time task fails without crashing anything.
    primary.insert_document(EntityKind::ScanEvent, scan_doc("s1", "q1"));
    wait_for(|| service.queue_stats().failed >= 1).await;
    assert_eq!(secondary.row_count(EntityKind::ScanEvent), 0);

    // Parents appear and replicate through the real-time path.
    primary.insert_document(EntityKind::User, user_doc("u1"));
    primary.insert_document(EntityKind::EncodedArtifact, artifact_doc("q1", "u1", true));
    wait_for(|| secondary.row_count(EntityKind::EncodedArtifact) == 1).await;

    // The next reconciliation pass re-derives the scan from its timestamp
    // and succeeds now that the parent rows exist.
    service.reconcile_now().await;
    assert_eq!(secondary.row_count(EntityKind::ScanEvent), 1);

    let status = service.status();
    assert_eq!(status.stats.total_batches, 1);
    assert_eq!(status.stats.successful_batches, 1);

    service.stop().await;
}

#[tokio::test]
async fn secondary_outage_is_healed_by_reconciliation() {
    let primary = Arc::new(MemoryPrimary::new());
    let secondary = Arc::new(MemoryRelational::new());
    let mut service = started_service(&primary, &secondary).await;

    // Replica goes down mid-flight; the real-time task fails permanently
    // (retries exhausted) and is dropped.
    secondary.set_available(false);
    primary.insert_document(EntityKind::User, user_doc("u1"));
    wait_for(|| service.queue_stats().failed >= 1).await;

    // After recovery, one reconciliation pass restores consistency.
    secondary.set_available(true);
    service.reconcile_now().await;
    assert_eq!(secondary.row_count(EntityKind::User), 1);

    service.stop().await;
}

#[tokio::test]
async fn feed_drop_is_survived_by_resubscription() {
    let primary = Arc::new(MemoryPrimary::new());
    let secondary = Arc::new(MemoryRelational::new());
    let mut service = started_service(&primary, &secondary).await;

    primary.close_feeds();
    tokio::time::sleep(Duration::from_millis(80)).await;

    primary.insert_document(EntityKind::User, user_doc("u1"));
    wait_for(|| secondary.row_count(EntityKind::User) == 1).await;

    service.stop().await;
}

#[tokio::test]
async fn health_report_tracks_store_liveness() {
    init_logs();
    let primary = Arc::new(MemoryPrimary::new());
    let secondary = Arc::new(MemoryRelational::new());
    let mut service = SyncServiceBuilder::new()
        .with_primary(primary.clone())
        .with_secondary(secondary.clone())
        .with_health_interval(Duration::from_millis(30))
        .build()
        .unwrap();
    service.start().await.unwrap();

    wait_for(|| service.health().last_check.is_some()).await;
    assert!(service.health().primary_ok);
    assert!(service.health().secondary_ok);

    secondary.set_available(false);
    wait_for(|| !service.health().secondary_ok).await;

    secondary.set_available(true);
    wait_for(|| service.health().secondary_ok).await;

    service.stop().await;
}

#[tokio::test]
async fn reconciler_timer_runs_passes_without_overlap() {
    init_logs();
    let primary = Arc::new(MemoryPrimary::new());
    let secondary = Arc::new(MemoryRelational::new());
    let mut service = SyncServiceBuilder::new()
        .with_primary(primary.clone())
        .with_secondary(secondary.clone())
        .with_batch_interval(Duration::from_millis(50))
        .build()
        .unwrap();
    service.start().await.unwrap();

    primary.insert_document(EntityKind::User, user_doc("u1"));

    wait_for(|| service.status().stats.total_batches >= 2).await;
    let status = service.status();
    assert_eq!(status.stats.failed_batches, 0);
    assert!(!status.is_running);
    assert_eq!(secondary.row_count(EntityKind::User), 1);

    service.stop().await;
}
