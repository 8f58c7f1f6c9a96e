//! Command queue tests.

mod common;

use common::{command_plist, idle_plist, memory_store, results_plist};
use mdmkv::core::context::RequestContext;
use mdmkv::core::error::ErrorKind;
use mdmkv::mdm::{decode_results, Command};
use mdmkv::schema::QueueStatus;
use mdmkv::storage::{Item, KeyValueTable};
use mdmkv::StoreOptions;

const DEVICE: &str = "ABC-123";

fn command(uuid: &str) -> Command {
    Command::decode(&command_plist(uuid, "DeviceInformation")).unwrap()
}

fn report(uuid: &str, status: &str) -> mdmkv::mdm::CommandResults {
    decode_results(&results_plist(DEVICE, uuid, status)).unwrap()
}

// ============================================================================
// Enqueue and retrieve
// ============================================================================

#[test]
fn queued_command_is_delivered_verbatim() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let c = command("C");

    let failures = store.queue().enqueue_command(&ctx, &[DEVICE], &c);
    assert!(failures.is_empty());

    let next = store
        .queue()
        .retrieve_next_command(&ctx, DEVICE, true)
        .unwrap()
        .unwrap();
    assert_eq!(next.command_uuid, "C");
    assert_eq!(next.raw, c.raw);
}

#[test]
fn empty_queue_returns_none() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    assert!(store
        .queue()
        .retrieve_next_command(&ctx, DEVICE, false)
        .unwrap()
        .is_none());
}

#[test]
fn enqueue_writes_one_row_per_device() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();

    let ids = vec!["A".to_string(), "B".to_string()];
    let failures = store.queue().enqueue_command(&ctx, &ids, &command("C"));
    assert!(failures.is_empty());

    for id in &ids {
        let record = store.queue().retrieve_command(&ctx, id, "C").unwrap().unwrap();
        assert_eq!(record.status, QueueStatus::Queued);
        assert_eq!(record.request_type, "DeviceInformation");
    }
}

#[test]
fn enqueue_reports_failures_per_device() {
    let (store, _) = memory_store(StoreOptions::default());
    let expired = RequestContext::with_deadline(
        std::time::Instant::now() - std::time::Duration::from_millis(1),
    );

    let failures = store
        .queue()
        .enqueue_command(&expired, &["A", "B"], &command("C"));
    assert_eq!(failures.len(), 2);
    assert!(failures.values().all(|e| e.kind() == ErrorKind::Backend));
}

#[test]
fn two_commands_scenario() {
    let (store, clock) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let queue = store.queue();

    queue.enqueue_command(&ctx, &[DEVICE], &command("C1"));
    clock.advance_ms(10);
    queue.enqueue_command(&ctx, &[DEVICE], &command("C2"));

    let first = queue.retrieve_next_command(&ctx, DEVICE, true).unwrap().unwrap();
    assert_eq!(first.command_uuid, "C1");
    // Unreported, so still delivered.
    let again = queue.retrieve_next_command(&ctx, DEVICE, true).unwrap().unwrap();
    assert_eq!(again.command_uuid, "C1");

    queue
        .store_command_report(&ctx, DEVICE, &report("C1", "Error"))
        .unwrap();

    let next = queue.retrieve_next_command(&ctx, DEVICE, true).unwrap().unwrap();
    assert_eq!(next.command_uuid, "C2");
    let c1 = queue.retrieve_command(&ctx, DEVICE, "C1").unwrap().unwrap();
    assert_eq!(c1.status, QueueStatus::Done);
    assert_eq!(c1.report_status.as_deref(), Some("Error"));
}

#[test]
fn same_enqueue_time_orders_by_uuid() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();

    store.queue().enqueue_command(&ctx, &[DEVICE], &command("b"));
    store.queue().enqueue_command(&ctx, &[DEVICE], &command("a"));

    let next = store
        .queue()
        .retrieve_next_command(&ctx, DEVICE, false)
        .unwrap()
        .unwrap();
    assert_eq!(next.command_uuid, "a");
}

// ============================================================================
// Reports
// ============================================================================

#[test]
fn acknowledged_report_finishes_command() {
    let (store, clock) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    store.queue().enqueue_command(&ctx, &[DEVICE], &command("C"));
    clock.advance_ms(500);

    let results = report("C", "Acknowledged");
    store
        .queue()
        .store_command_report(&ctx, DEVICE, &results)
        .unwrap();

    let record = store.queue().retrieve_command(&ctx, DEVICE, "C").unwrap().unwrap();
    assert_eq!(record.status, QueueStatus::Done);
    assert_eq!(record.result, Some(results.raw));
    assert_eq!(record.last_updated.ms, record.enqueued_at.ms + 500);
    assert!(store
        .queue()
        .retrieve_next_command(&ctx, DEVICE, false)
        .unwrap()
        .is_none());
}

#[test]
fn not_now_defers_command() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    store.queue().enqueue_command(&ctx, &[DEVICE], &command("C"));

    store
        .queue()
        .store_command_report(&ctx, DEVICE, &report("C", "NotNow"))
        .unwrap();

    assert!(store
        .queue()
        .retrieve_next_command(&ctx, DEVICE, true)
        .unwrap()
        .is_none());
    let next = store
        .queue()
        .retrieve_next_command(&ctx, DEVICE, false)
        .unwrap()
        .unwrap();
    assert_eq!(next.command_uuid, "C");

    // A deferred command can still finish.
    store
        .queue()
        .store_command_report(&ctx, DEVICE, &report("C", "Acknowledged"))
        .unwrap();
    let record = store.queue().retrieve_command(&ctx, DEVICE, "C").unwrap().unwrap();
    assert_eq!(record.status, QueueStatus::Done);
}

#[test]
fn idle_report_changes_nothing() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    store.queue().enqueue_command(&ctx, &[DEVICE], &command("C"));
    let before = store.queue().list_commands(&ctx, DEVICE).unwrap();

    let idle = decode_results(&idle_plist(DEVICE)).unwrap();
    store.queue().store_command_report(&ctx, DEVICE, &idle).unwrap();

    assert_eq!(store.queue().list_commands(&ctx, DEVICE).unwrap(), before);
}

#[test]
fn report_on_unknown_command_is_not_found() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let err = store
        .queue()
        .store_command_report(&ctx, DEVICE, &report("missing", "Acknowledged"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn late_report_never_requeues_finished_command() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    store.queue().enqueue_command(&ctx, &[DEVICE], &command("C"));

    store
        .queue()
        .store_command_report(&ctx, DEVICE, &report("C", "Acknowledged"))
        .unwrap();
    store
        .queue()
        .store_command_report(&ctx, DEVICE, &report("C", "NotNow"))
        .unwrap();

    let record = store.queue().retrieve_command(&ctx, DEVICE, "C").unwrap().unwrap();
    assert_eq!(record.status, QueueStatus::Done);
    assert_eq!(record.report_status.as_deref(), Some("Acknowledged"));
}

#[test]
fn corrupt_command_row_is_decode_error() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    store
        .table()
        .put_item(&ctx, Item::new("queue#ABC-123", "C").with("status", "Queue"))
        .unwrap();

    let err = store
        .queue()
        .retrieve_next_command(&ctx, DEVICE, true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
}

// ============================================================================
// Clear queue
// ============================================================================

#[test]
fn clear_queue_invalidates_every_command() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let queue = store.queue();

    queue.enqueue_command(&ctx, &[DEVICE], &command("C1"));
    queue.enqueue_command(&ctx, &[DEVICE], &command("C2"));
    queue.enqueue_command(&ctx, &[DEVICE], &command("C3"));
    queue
        .store_command_report(&ctx, DEVICE, &report("C2", "NotNow"))
        .unwrap();
    queue
        .store_command_report(&ctx, DEVICE, &report("C3", "Acknowledged"))
        .unwrap();

    queue.clear_queue(&ctx, DEVICE).unwrap();

    let records = queue.list_commands(&ctx, DEVICE).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.status == QueueStatus::Inactive));
    assert!(queue.retrieve_next_command(&ctx, DEVICE, false).unwrap().is_none());

    // Late report after invalidation is dropped.
    queue
        .store_command_report(&ctx, DEVICE, &report("C1", "Acknowledged"))
        .unwrap();
    let c1 = queue.retrieve_command(&ctx, DEVICE, "C1").unwrap().unwrap();
    assert_eq!(c1.status, QueueStatus::Inactive);
}

#[test]
fn clear_queue_leaves_other_devices_alone() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();

    store
        .queue()
        .enqueue_command(&ctx, &[DEVICE, "OTHER"], &command("C"));
    store.queue().clear_queue(&ctx, DEVICE).unwrap();

    let other = store
        .queue()
        .retrieve_next_command(&ctx, "OTHER", true)
        .unwrap();
    assert!(other.is_some());
}

// ============================================================================
// Physical deletion
// ============================================================================

#[test]
fn delete_commands_removes_finished_rows() {
    let (store, _) = memory_store(StoreOptions {
        delete_commands: true,
        ..Default::default()
    });
    let ctx = RequestContext::background();
    let queue = store.queue();

    queue.enqueue_command(&ctx, &[DEVICE], &command("C1"));
    queue.enqueue_command(&ctx, &[DEVICE], &command("C2"));

    queue
        .store_command_report(&ctx, DEVICE, &report("C1", "Acknowledged"))
        .unwrap();
    assert!(queue.retrieve_command(&ctx, DEVICE, "C1").unwrap().is_none());

    // NotNow keeps the row.
    queue
        .store_command_report(&ctx, DEVICE, &report("C2", "NotNow"))
        .unwrap();
    let c2 = queue.retrieve_command(&ctx, DEVICE, "C2").unwrap().unwrap();
    assert_eq!(c2.status, QueueStatus::NotNow);

    queue.clear_queue(&ctx, DEVICE).unwrap();
    assert!(queue.list_commands(&ctx, DEVICE).unwrap().is_empty());
}
