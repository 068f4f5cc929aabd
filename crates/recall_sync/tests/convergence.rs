//! Store-to-store sync tests over in-memory databases.

use recall_core::{AttachmentMimeType, Database, EntityQuery, EntityType};
use recall_store_memory::MemoryBackend;
use recall_sync::{DatabaseEndpoint, SyncConfig, SyncEngine};
use recall_testkit::{expect_task, EventFactory};
use std::sync::Arc;

fn memory_db() -> Arc<Database> {
    Arc::new(Database::new(Arc::new(MemoryBackend::new())))
}

fn engine(
    local: Arc<Database>,
    remote: Arc<Database>,
    config: SyncConfig,
) -> SyncEngine<DatabaseEndpoint> {
    SyncEngine::new(local, DatabaseEndpoint::new(remote), config)
}

fn snapshot_json(db: &Database) -> Vec<serde_json::Value> {
    let mut entities = db
        .list_entities(&EntityQuery::all(EntityType::Task, 10_000))
        .unwrap();
    entities.extend(
        db.list_entities(&EntityQuery::all(EntityType::AttachmentReference, 10_000))
            .unwrap(),
    );
    let mut values: Vec<serde_json::Value> = entities
        .iter()
        .map(|e| serde_json::to_value(e).unwrap())
        .collect();
    values.sort_by_key(|v| v["id"].as_str().unwrap_or_default().to_string());
    values
}

#[test]
fn disjoint_writes_converge_to_the_union() {
    let a = memory_db();
    let b = memory_db();
    let mut factory_a = EventFactory::new(1, 1_700_000_000_000);
    let mut factory_b = EventFactory::new(2, 1_700_000_000_000);

    for i in 0..7 {
        let task = factory_a.entity_id();
        a.put_events(vec![factory_a.ingest_qa(&task, &format!("a{i}"), "x")])
            .unwrap();
    }
    for i in 0..5 {
        let task = factory_b.entity_id();
        b.put_events(vec![factory_b.ingest_qa(&task, &format!("b{i}"), "y")])
            .unwrap();
    }

    let engine = engine(a.clone(), b.clone(), SyncConfig::new("b"));
    let summary = engine.sync().unwrap();
    assert_eq!(summary.pulled, 5);
    assert_eq!(summary.pushed, 12);

    let snapshots_a = snapshot_json(&a);
    let snapshots_b = snapshot_json(&b);
    assert_eq!(snapshots_a.len(), 12);
    assert_eq!(snapshots_a, snapshots_b);
}

#[test]
fn quiescent_stores_transfer_nothing() {
    let a = memory_db();
    let b = memory_db();
    let mut factory = EventFactory::new(3, 1_000);
    let task = factory.entity_id();
    a.put_events(vec![factory.ingest_qa(&task, "q", "ans")]).unwrap();

    let engine = engine(a, b, SyncConfig::new("b"));
    engine.sync().unwrap();

    let second = engine.sync().unwrap();
    assert_eq!(second.pulled, 0);
    assert_eq!(second.pushed, 0);
    assert_eq!(engine.stats().passes_completed, 2);
}

#[test]
fn small_batches_converge_across_interleaved_entities() {
    let a = memory_db();
    let b = memory_db();
    let mut factory = EventFactory::new(4, 1_000_000);

    // Several events per entity, so batches split mid-entity.
    let tasks: Vec<_> = (0..4).map(|_| factory.entity_id()).collect();
    for round in 0..3 {
        for task in &tasks {
            factory.advance(1_000);
            let event = if round == 0 {
                factory.ingest_qa(task, "body", "answer")
            } else {
                factory.repetition(
                    task,
                    "main",
                    recall_core::RepetitionOutcome::Remembered,
                    factory.now() + 86_400_000,
                    86_400_000,
                )
            };
            a.put_events(vec![event]).unwrap();
        }
    }

    let config = SyncConfig::new("b")
        .with_receive_batch_size(5)
        .with_send_batch_size(5);
    let engine = engine(a.clone(), b.clone(), config);
    engine.sync().unwrap();

    assert_eq!(snapshot_json(&a), snapshot_json(&b));
}

#[test]
fn duplicate_push_applies_nothing() {
    let a = memory_db();
    let b = memory_db();
    let mut factory = EventFactory::new(5, 1_000);

    let events: Vec<_> = (0..5)
        .map(|i| {
            let task = factory.entity_id();
            factory.ingest_qa(&task, &format!("q{i}"), "a")
        })
        .collect();
    a.put_events(events.clone()).unwrap();

    let engine = engine(a, b.clone(), SyncConfig::new("b"));
    engine.sync().unwrap();

    // Same batch again, straight at the remote: all duplicates.
    let applied = b.put_events(events).unwrap();
    assert_eq!(applied.len(), 0);
}

#[test]
fn attachment_payloads_travel_with_their_references() {
    let a = memory_db();
    let b = memory_db();
    let mut factory = EventFactory::new(6, 1_000);

    // Outgoing: reference and payload on the local side.
    let outgoing = factory.entity_id();
    a.put_events(vec![
        factory.attachment_ingest(&outgoing, AttachmentMimeType::Png)
    ])
    .unwrap();
    a.put_attachment(&outgoing, AttachmentMimeType::Png, b"png-bytes")
        .unwrap();

    // Incoming: reference and payload on the remote side.
    let incoming = factory.entity_id();
    b.put_events(vec![
        factory.attachment_ingest(&incoming, AttachmentMimeType::Svg)
    ])
    .unwrap();
    b.put_attachment(&incoming, AttachmentMimeType::Svg, b"<svg/>")
        .unwrap();

    let engine = engine(a.clone(), b.clone(), SyncConfig::new("b"));
    let summary = engine.sync().unwrap();
    assert_eq!(summary.attachments, 2);

    let (mime, bytes) = a.get_attachment(&incoming).unwrap().unwrap();
    assert_eq!(mime, AttachmentMimeType::Svg);
    assert_eq!(bytes, b"<svg/>");
    let (mime, bytes) = b.get_attachment(&outgoing).unwrap().unwrap();
    assert_eq!(mime, AttachmentMimeType::Png);
    assert_eq!(bytes, b"png-bytes");
}

#[test]
fn writers_on_the_same_component_converge() {
    let a = memory_db();
    let b = memory_db();
    let mut early = EventFactory::new(8, 1_000);
    let mut late = EventFactory::new(9, 9_000_000);

    // Both stores start from the same ingested card.
    let task = early.entity_id();
    let ingest = early.ingest_qa(&task, "shared", "card");
    a.put_events(vec![ingest.clone()]).unwrap();
    b.put_events(vec![ingest]).unwrap();

    // B reviews the card; A reschedules it with a later event ID. Each side
    // sees the other's event after folding its own.
    early.advance(1_000);
    let repetition = early.repetition(
        &task,
        "main",
        recall_core::RepetitionOutcome::Remembered,
        999,
        10,
    );
    let reschedule = late.reschedule(&task, "main", 111, None);
    assert!(repetition.id < reschedule.id);
    b.put_events(vec![repetition]).unwrap();
    a.put_events(vec![reschedule]).unwrap();

    let engine = engine(a.clone(), b.clone(), SyncConfig::new("b"));
    engine.sync().unwrap();
    let second = engine.sync().unwrap();
    assert_eq!(second.pulled, 0);
    assert_eq!(snapshot_json(&a), snapshot_json(&b));

    // The larger-ID reschedule decides the due date on both sides, and the
    // repetition is not lost.
    let entities = a.get_entities(&[task.clone()]).unwrap();
    let state = &expect_task(&entities[&task]).component_states["main"];
    assert_eq!(state.due_timestamp_millis, 111);
    assert!(state.last_repetition_timestamp_millis.is_some());
}

#[test]
fn retried_pull_still_backfills_attachment_payloads() {
    let a = memory_db();
    let b = memory_db();
    let mut factory = EventFactory::new(10, 1_000);

    let reference = factory.entity_id();
    let event = factory.attachment_ingest(&reference, AttachmentMimeType::Png);
    b.put_events(vec![event.clone()]).unwrap();
    b.put_attachment(&reference, AttachmentMimeType::Png, b"payload")
        .unwrap();

    // The reference already landed locally: an earlier pass stopped between
    // applying the batch and transferring the payload, before the received
    // checkpoint advanced.
    a.put_events(vec![event]).unwrap();

    let engine = engine(a.clone(), b, SyncConfig::new("b"));
    let summary = engine.sync().unwrap();
    assert_eq!(summary.pulled, 0);
    assert_eq!(summary.attachments, 1);

    let (mime, bytes) = a.get_attachment(&reference).unwrap().unwrap();
    assert_eq!(mime, AttachmentMimeType::Png);
    assert_eq!(bytes, b"payload");
}

#[test]
fn interrupted_pass_resumes_from_checkpoints() {
    let a = memory_db();
    let b = memory_db();
    let mut factory = EventFactory::new(7, 1_000);

    for i in 0..6 {
        let task = factory.entity_id();
        b.put_events(vec![factory.ingest_qa(&task, &format!("r{i}"), "a")])
            .unwrap();
    }

    // First engine pulls everything; a second engine for the same peer sees
    // the persisted checkpoints and has nothing left to transfer.
    let first = engine(a.clone(), b.clone(), SyncConfig::new("server"));
    first.sync().unwrap();

    let second = engine(a.clone(), b, SyncConfig::new("server"));
    let summary = second.sync().unwrap();
    assert_eq!(summary.pulled, 0);
    assert_eq!(summary.pushed, 0);
    assert_eq!(snapshot_json(&a).len(), 6);
}
