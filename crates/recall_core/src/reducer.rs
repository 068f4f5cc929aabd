//! The pure reducer: `(prior snapshot, event) -> new snapshot`.
//!
//! No I/O happens here. The fold is deterministic, so replaying the same
//! events in the same event-ID order always yields bitwise-identical
//! snapshots, and ingest events are first-write-wins so replay is idempotent
//! even without ID-based dedup.

use crate::entity::{AttachmentReference, Entity, Task, TaskComponentState};
use crate::error::{CoreError, CoreResult};
use crate::event::{Event, EventPayload};
use std::collections::BTreeMap;

/// Applies one event to a prior snapshot, producing the next snapshot.
///
/// # Errors
///
/// Returns [`CoreError::EntityMismatch`] when the event cannot apply to the
/// prior snapshot: a task event with no prior ingest, or an event whose kind
/// does not match the entity's construction history. These indicate a
/// programming error or a corrupted log, not user input problems.
pub fn reduce(prior: Option<&Entity>, event: &Event) -> CoreResult<Entity> {
    match &event.payload {
        EventPayload::TaskIngest {
            spec,
            provenance,
            metadata,
        } => {
            if let Some(existing) = prior {
                // Re-ingest of a known task is a no-op.
                expect_task(existing, event)?;
                return Ok(existing.clone());
            }
            let mut component_states = BTreeMap::new();
            for component_id in spec.component_ids() {
                component_states.insert(
                    component_id,
                    TaskComponentState {
                        created_at_timestamp_millis: event.timestamp_millis,
                        last_repetition_timestamp_millis: None,
                        due_timestamp_millis: event.timestamp_millis,
                        interval_millis: 0,
                    },
                );
            }
            Ok(Entity::Task(Task {
                id: event.entity_id.clone(),
                created_at_timestamp_millis: event.timestamp_millis,
                spec: spec.clone(),
                provenance: provenance.clone(),
                component_states,
                is_deleted: false,
                metadata: metadata.clone(),
            }))
        }

        EventPayload::TaskRepetition {
            component_id,
            outcome: _,
            schedule,
        } => {
            let mut task = expect_prior_task(prior, event)?;
            let state = task
                .component_states
                .entry(component_id.clone())
                .or_insert(TaskComponentState {
                    created_at_timestamp_millis: event.timestamp_millis,
                    last_repetition_timestamp_millis: None,
                    due_timestamp_millis: event.timestamp_millis,
                    interval_millis: 0,
                });
            state.last_repetition_timestamp_millis = Some(event.timestamp_millis);
            state.due_timestamp_millis = schedule.due_timestamp_millis;
            state.interval_millis = schedule.interval_millis;
            Ok(Entity::Task(task))
        }

        EventPayload::TaskReschedule {
            component_id,
            new_due_timestamp_millis,
            new_interval_millis,
        } => {
            let mut task = expect_prior_task(prior, event)?;
            let state = task
                .component_states
                .entry(component_id.clone())
                .or_insert(TaskComponentState {
                    created_at_timestamp_millis: event.timestamp_millis,
                    last_repetition_timestamp_millis: None,
                    due_timestamp_millis: event.timestamp_millis,
                    interval_millis: 0,
                });
            state.due_timestamp_millis = *new_due_timestamp_millis;
            if let Some(interval) = new_interval_millis {
                state.interval_millis = *interval;
            }
            Ok(Entity::Task(task))
        }

        EventPayload::TaskUpdateDeleted { is_deleted } => {
            let mut task = expect_prior_task(prior, event)?;
            task.is_deleted = *is_deleted;
            Ok(Entity::Task(task))
        }

        EventPayload::TaskUpdateSpec { spec } => {
            let mut task = expect_prior_task(prior, event)?;
            task.spec = spec.clone();
            Ok(Entity::Task(task))
        }

        EventPayload::TaskUpdateProvenance { provenance } => {
            let mut task = expect_prior_task(prior, event)?;
            task.provenance = provenance.clone();
            Ok(Entity::Task(task))
        }

        EventPayload::TaskUpdateMetadata { entries } => {
            let mut task = expect_prior_task(prior, event)?;
            for (key, value) in entries {
                task.metadata.insert(key.clone(), value.clone());
            }
            Ok(Entity::Task(task))
        }

        EventPayload::AttachmentIngest { mime_type } => {
            if let Some(existing) = prior {
                // First write wins, matching task ingest.
                if existing.as_task().is_some() {
                    return Err(CoreError::entity_mismatch(
                        event.entity_id.as_str(),
                        event.type_name(),
                        "prior snapshot is a task",
                    ));
                }
                return Ok(existing.clone());
            }
            Ok(Entity::AttachmentReference(AttachmentReference {
                id: event.entity_id.clone(),
                created_at_timestamp_millis: event.timestamp_millis,
                mime_type: *mime_type,
            }))
        }
    }
}

fn expect_task<'a>(entity: &'a Entity, event: &Event) -> CoreResult<&'a Task> {
    entity.as_task().ok_or_else(|| {
        CoreError::entity_mismatch(
            event.entity_id.as_str(),
            event.type_name(),
            "prior snapshot is not a task",
        )
    })
}

fn expect_prior_task(prior: Option<&Entity>, event: &Event) -> CoreResult<Task> {
    match prior {
        Some(entity) => Ok(expect_task(entity, event)?.clone()),
        None => Err(CoreError::entity_mismatch(
            event.entity_id.as_str(),
            event.type_name(),
            "no prior snapshot; ingest event missing",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AttachmentMimeType, TaskSpec};
    use crate::event::{ComponentSchedule, RepetitionOutcome};
    use crate::ids::{EntityId, OrderedIdGenerator};
    use std::collections::BTreeMap;

    struct Fixture {
        gen: OrderedIdGenerator,
        entity_id: EntityId,
        clock: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                gen: OrderedIdGenerator::from_seed(11),
                entity_id: EntityId::random(),
                clock: 1_700_000_000_000,
            }
        }

        fn event(&mut self, payload: EventPayload) -> Event {
            self.clock += 1_000;
            Event {
                id: self.gen.generate_at(self.clock),
                entity_id: self.entity_id.clone(),
                timestamp_millis: self.clock as i64,
                payload,
            }
        }

        fn ingest(&mut self) -> Event {
            self.event(EventPayload::TaskIngest {
                spec: TaskSpec::Qa {
                    body: "q".into(),
                    answer: "a".into(),
                },
                provenance: None,
                metadata: BTreeMap::new(),
            })
        }
    }

    #[test]
    fn ingest_seeds_component_states() {
        let mut fx = Fixture::new();
        let event = fx.ingest();
        let entity = reduce(None, &event).unwrap();
        let task = entity.as_task().unwrap();
        assert_eq!(task.id, fx.entity_id);
        assert_eq!(task.component_states.len(), 1);
        let state = &task.component_states["main"];
        assert_eq!(state.due_timestamp_millis, event.timestamp_millis);
        assert_eq!(state.interval_millis, 0);
        assert!(state.last_repetition_timestamp_millis.is_none());
        assert!(!task.is_deleted);
    }

    #[test]
    fn reingest_is_noop() {
        let mut fx = Fixture::new();
        let first = fx.ingest();
        let entity = reduce(None, &first).unwrap();

        let mut second = fx.ingest();
        second.payload = EventPayload::TaskIngest {
            spec: TaskSpec::Plain {
                body: "different".into(),
            },
            provenance: None,
            metadata: BTreeMap::new(),
        };
        let after = reduce(Some(&entity), &second).unwrap();
        assert_eq!(after, entity);
    }

    #[test]
    fn repetition_updates_only_named_component() {
        let mut fx = Fixture::new();
        let mut components = BTreeMap::new();
        components.insert("0".to_string(), vec![]);
        components.insert("1".to_string(), vec![]);
        let ingest = fx.event(EventPayload::TaskIngest {
            spec: TaskSpec::Cloze {
                body: "a b".into(),
                components,
            },
            provenance: None,
            metadata: BTreeMap::new(),
        });
        let entity = reduce(None, &ingest).unwrap();

        let rep = fx.event(EventPayload::TaskRepetition {
            component_id: "0".into(),
            outcome: RepetitionOutcome::Remembered,
            schedule: ComponentSchedule {
                due_timestamp_millis: 1_800_000_000_000,
                interval_millis: 86_400_000,
            },
        });
        let after = reduce(Some(&entity), &rep).unwrap();
        let task = after.as_task().unwrap();

        let touched = &task.component_states["0"];
        assert_eq!(touched.due_timestamp_millis, 1_800_000_000_000);
        assert_eq!(touched.interval_millis, 86_400_000);
        assert_eq!(
            touched.last_repetition_timestamp_millis,
            Some(rep.timestamp_millis)
        );

        let untouched = &task.component_states["1"];
        assert_eq!(
            untouched,
            &entity.as_task().unwrap().component_states["1"]
        );
    }

    #[test]
    fn reschedule_keeps_last_repetition() {
        let mut fx = Fixture::new();
        let entity = reduce(None, &fx.ingest()).unwrap();

        let rep = fx.event(EventPayload::TaskRepetition {
            component_id: "main".into(),
            outcome: RepetitionOutcome::Forgotten,
            schedule: ComponentSchedule {
                due_timestamp_millis: 10,
                interval_millis: 5,
            },
        });
        let entity = reduce(Some(&entity), &rep).unwrap();

        let resched = fx.event(EventPayload::TaskReschedule {
            component_id: "main".into(),
            new_due_timestamp_millis: 99,
            new_interval_millis: None,
        });
        let after = reduce(Some(&entity), &resched).unwrap();
        let state = &after.as_task().unwrap().component_states["main"];
        assert_eq!(state.due_timestamp_millis, 99);
        assert_eq!(state.interval_millis, 5);
        assert_eq!(
            state.last_repetition_timestamp_millis,
            Some(rep.timestamp_millis)
        );
    }

    #[test]
    fn delete_flag_is_reversible() {
        let mut fx = Fixture::new();
        let entity = reduce(None, &fx.ingest()).unwrap();

        let deleted = reduce(
            Some(&entity),
            &fx.event(EventPayload::TaskUpdateDeleted { is_deleted: true }),
        )
        .unwrap();
        assert!(deleted.as_task().unwrap().is_deleted);

        let restored = reduce(
            Some(&deleted),
            &fx.event(EventPayload::TaskUpdateDeleted { is_deleted: false }),
        )
        .unwrap();
        assert!(!restored.as_task().unwrap().is_deleted);
    }

    #[test]
    fn metadata_update_merges_keys() {
        let mut fx = Fixture::new();
        let entity = reduce(None, &fx.ingest()).unwrap();

        let first = reduce(
            Some(&entity),
            &fx.event(EventPayload::TaskUpdateMetadata {
                entries: BTreeMap::from([
                    ("a".to_string(), "1".to_string()),
                    ("b".to_string(), "2".to_string()),
                ]),
            }),
        )
        .unwrap();

        let second = reduce(
            Some(&first),
            &fx.event(EventPayload::TaskUpdateMetadata {
                entries: BTreeMap::from([("b".to_string(), "3".to_string())]),
            }),
        )
        .unwrap();

        let metadata = &second.as_task().unwrap().metadata;
        assert_eq!(metadata["a"], "1");
        assert_eq!(metadata["b"], "3");
    }

    #[test]
    fn task_event_without_prior_is_mismatch() {
        let mut fx = Fixture::new();
        let orphan = fx.event(EventPayload::TaskUpdateDeleted { is_deleted: true });
        let result = reduce(None, &orphan);
        assert!(matches!(result, Err(CoreError::EntityMismatch { .. })));
    }

    #[test]
    fn attachment_ingest_first_write_wins() {
        let mut fx = Fixture::new();
        let first = fx.event(EventPayload::AttachmentIngest {
            mime_type: AttachmentMimeType::Png,
        });
        let entity = reduce(None, &first).unwrap();

        let second = fx.event(EventPayload::AttachmentIngest {
            mime_type: AttachmentMimeType::Jpeg,
        });
        let after = reduce(Some(&entity), &second).unwrap();
        assert_eq!(after, entity);
    }

    #[test]
    fn attachment_ingest_on_task_is_mismatch() {
        let mut fx = Fixture::new();
        let entity = reduce(None, &fx.ingest()).unwrap();
        let bad = fx.event(EventPayload::AttachmentIngest {
            mime_type: AttachmentMimeType::Png,
        });
        assert!(matches!(
            reduce(Some(&entity), &bad),
            Err(CoreError::EntityMismatch { .. })
        ));
    }

    #[test]
    fn replay_is_deterministic() {
        let mut fx = Fixture::new();
        let events = vec![
            fx.ingest(),
            fx.event(EventPayload::TaskRepetition {
                component_id: "main".into(),
                outcome: RepetitionOutcome::Remembered,
                schedule: ComponentSchedule {
                    due_timestamp_millis: 77,
                    interval_millis: 33,
                },
            }),
            fx.event(EventPayload::TaskUpdateMetadata {
                entries: BTreeMap::from([("k".to_string(), "v".to_string())]),
            }),
        ];

        let fold = |events: &[Event]| {
            let mut snapshot: Option<Entity> = None;
            for event in events {
                snapshot = Some(reduce(snapshot.as_ref(), event).unwrap());
            }
            snapshot.unwrap()
        };

        let a = fold(&events);
        let b = fold(&events);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
