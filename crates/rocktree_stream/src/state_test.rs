use super::*;
use crate::test_utils::path;

fn failure(lane: FailedLane, frame: u64, permanent: bool) -> FailureInfo {
  FailureInfo {
    lane,
    frame,
    permanent,
    reason: "test".to_string(),
  }
}

#[test]
fn test_legal_table_size() {
  let triggers = [
    Trigger::Selector,
    Trigger::FetchCompletion,
    Trigger::DecoderCompletion,
    Trigger::CacheEviction,
  ];
  let mut legal = 0;
  for from in NodeState::ALL {
    for to in NodeState::ALL {
      for trigger in triggers {
        if is_legal(from, to, trigger) {
          legal += 1;
        }
      }
    }
  }
  assert_eq!(legal, 16);
}

#[test]
fn test_trigger_matters() {
  use NodeState::*;
  assert!(is_legal(DataRequested, Decoding, Trigger::FetchCompletion));
  assert!(!is_legal(DataRequested, Decoding, Trigger::DecoderCompletion));
  assert!(is_legal(Decoding, Resident, Trigger::DecoderCompletion));
  assert!(!is_legal(Decoding, Resident, Trigger::Selector));
  assert!(!is_legal(Resident, Unknown, Trigger::CacheEviction));
}

#[test]
fn test_full_data_lifecycle() {
  let mut table = StateTable::new();
  let p = path("0123");
  assert_eq!(table.state(&p), NodeState::Unknown);

  table.transition(&p, NodeState::MetadataRequested, Trigger::Selector).unwrap();
  table.transition(&p, NodeState::ShapeKnown, Trigger::DecoderCompletion).unwrap();
  table.transition(&p, NodeState::DataRequested, Trigger::Selector).unwrap();
  table.transition(&p, NodeState::Decoding, Trigger::FetchCompletion).unwrap();
  table.transition(&p, NodeState::Resident, Trigger::DecoderCompletion).unwrap();
  table.transition(&p, NodeState::Evicting, Trigger::CacheEviction).unwrap();
  let previous = table.transition(&p, NodeState::Unknown, Trigger::CacheEviction).unwrap();
  assert_eq!(previous, NodeState::Evicting);
  assert!(table.record(&p).is_none());
}

#[test]
fn test_invalid_transition_rejected() {
  let mut table = StateTable::new();
  let p = path("1");
  let err = table.transition(&p, NodeState::Resident, Trigger::DecoderCompletion).unwrap_err();
  assert_eq!(err.from, NodeState::Unknown);
  assert_eq!(err.to, NodeState::Resident);
  assert_eq!(table.state(&p), NodeState::Unknown);
}

#[test]
fn test_retry_from_failed_counts_and_clears_failure() {
  let mut table = StateTable::new();
  let p = path("2");
  table.transition(&p, NodeState::ShapeKnown, Trigger::Selector).unwrap();
  table.transition(&p, NodeState::DataRequested, Trigger::Selector).unwrap();
  table
    .fail(&p, Trigger::FetchCompletion, failure(FailedLane::Data, 10, false))
    .unwrap();
  assert_eq!(table.failure(&p).unwrap().lane, FailedLane::Data);

  assert!(!table.retry_due(&p, 12, 5));
  assert!(table.retry_due(&p, 15, 5));

  table.transition(&p, NodeState::DataRequested, Trigger::Selector).unwrap();
  let record = table.record(&p).unwrap();
  assert_eq!(record.retries, 1);
  assert!(record.failure.is_none());
}

#[test]
fn test_permanent_failure_not_due() {
  let mut table = StateTable::new();
  let p = path("3");
  table.transition(&p, NodeState::MetadataRequested, Trigger::Selector).unwrap();
  table
    .fail(&p, Trigger::DecoderCompletion, failure(FailedLane::Metadata, 0, true))
    .unwrap();
  assert!(!table.retry_due(&p, 1_000, 0));
}

#[test]
fn test_huge_cooldown_never_due() {
  let mut table = StateTable::new();
  let p = path("4");
  table.transition(&p, NodeState::MetadataRequested, Trigger::Selector).unwrap();
  table
    .fail(&p, Trigger::FetchCompletion, failure(FailedLane::Metadata, 7, false))
    .unwrap();
  assert!(!table.retry_due(&p, u64::MAX - 1, u64::MAX));
  assert!(!table.retry_due(&p, 8, u64::MAX - 7));
  assert!(table.retry_due(&p, u64::MAX, u64::MAX - 7));
}

#[test]
fn test_counts_and_in_state() {
  let mut table = StateTable::new();
  for p in ["5", "1", "12"] {
    table.transition(&path(p), NodeState::ShapeKnown, Trigger::Selector).unwrap();
  }
  table.transition(&path("12"), NodeState::DataRequested, Trigger::Selector).unwrap();

  let counts = table.counts();
  assert_eq!(counts[NodeState::ShapeKnown.index()], 2);
  assert_eq!(counts[NodeState::DataRequested.index()], 1);
  assert_eq!(table.in_state(NodeState::ShapeKnown), vec![path("1"), path("5")]);
}
