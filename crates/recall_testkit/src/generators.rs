//! Property-based test generators using proptest.
//!
//! Strategies produce values that already satisfy ingestion validation, so
//! property tests exercise store semantics rather than input rejection.

use proptest::prelude::*;
use recall_core::{ClozeRange, EntityId, RepetitionOutcome, TaskSpec};
use std::collections::BTreeMap;

/// Strategy for valid 22-character entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::string::string_regex("[A-Za-z0-9_-]{22}")
        .expect("invalid regex")
        .prop_map(|s| EntityId::parse(s).expect("generated ID must parse"))
}

/// Strategy for component identifiers.
pub fn component_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("invalid regex")
}

/// Strategy for positive millisecond timestamps in a plausible range.
pub fn timestamp_strategy() -> impl Strategy<Value = i64> {
    1_500_000_000_000i64..1_900_000_000_000i64
}

/// Strategy for review outcomes.
pub fn outcome_strategy() -> impl Strategy<Value = RepetitionOutcome> {
    prop_oneof![
        Just(RepetitionOutcome::Remembered),
        Just(RepetitionOutcome::Forgotten),
    ]
}

/// Strategy for non-empty prompt bodies.
pub fn body_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{1,80}").expect("invalid regex")
}

/// Strategy for valid task specs across all three content types. Cloze
/// ranges are kept inside the generated body.
pub fn task_spec_strategy() -> impl Strategy<Value = TaskSpec> {
    let qa = (body_strategy(), body_strategy())
        .prop_map(|(body, answer)| TaskSpec::Qa { body, answer });
    let plain = body_strategy().prop_map(|body| TaskSpec::Plain { body });
    let cloze = (body_strategy(), prop::collection::vec(component_id_strategy(), 1..4))
        .prop_map(|(body, ids)| {
            let len = body.len();
            let components = ids
                .into_iter()
                .map(|id| {
                    (
                        id,
                        vec![ClozeRange {
                            start_index: 0,
                            length: len,
                        }],
                    )
                })
                .collect();
            TaskSpec::Cloze { body, components }
        });
    prop_oneof![qa, plain, cloze]
}

/// Strategy for small metadata maps with non-empty keys.
pub fn metadata_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,10}").expect("invalid regex"),
        prop::string::string_regex("[ -~]{0,20}").expect("invalid regex"),
        0..4,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{validate_event, Event, EventPayload};
    use recall_core::OrderedIdGenerator;

    proptest! {
        #[test]
        fn generated_ingests_pass_validation(
            spec in task_spec_strategy(),
            metadata in metadata_strategy(),
            timestamp in timestamp_strategy(),
        ) {
            let mut generator = OrderedIdGenerator::from_seed(11);
            let event = Event {
                id: generator.generate_at(timestamp as u64),
                entity_id: EntityId::random(),
                timestamp_millis: timestamp,
                payload: EventPayload::TaskIngest {
                    spec,
                    provenance: None,
                    metadata,
                },
            };
            prop_assert!(validate_event(&event).is_empty());
        }

        #[test]
        fn generated_ids_roundtrip(id in entity_id_strategy()) {
            prop_assert_eq!(EntityId::parse(id.as_str()).unwrap(), id);
        }
    }
}
