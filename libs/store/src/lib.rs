use std::fmt;
use std::fmt::Write as _;

use dashmap::DashMap;
use serde::Serialize;

use observer_api::{
    AcknowledgedMessage, CommittedMessage, ConsumedMessage, FailedMessage, Observation,
    PublishedMessage, RecordKind,
};

// ═══════════════════════════════════════════════════════════════
//  ObservationStore
// ═══════════════════════════════════════════════════════════════

/// Append-only, in-memory store of everything observed during a test run.
///
/// One concurrent map per [`RecordKind`], keyed by observation id. Writers
/// (bridge connections) and readers (polling assertions) never contend on
/// a store-wide lock. Nothing here fails: "not observed yet" is an empty
/// snapshot.
pub struct ObservationStore {
    buckets: [DashMap<String, Observation>; 6],
    /// Highest committed offset per (topic, partition). Only moves forward.
    watermarks: DashMap<(String, i32), i64>,
}

impl Default for ObservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObservationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationStore")
            .field("summary", &self.summary())
            .finish_non_exhaustive()
    }
}

impl ObservationStore {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| DashMap::new()),
            watermarks: DashMap::new(),
        }
    }

    fn bucket(&self, kind: RecordKind) -> &DashMap<String, Observation> {
        &self.buckets[kind.index()]
    }

    /// Append an observation to the bucket of its kind.
    pub fn record(&self, observation: Observation) {
        let kind = observation.kind();
        if let Observation::Committed(commit) = &observation {
            self.advance_watermark(commit);
        }
        tracing::debug!(
            kind = %kind,
            id = %observation.id(),
            topic = %observation.topic(),
            "recorded observation"
        );
        self.bucket(kind)
            .insert(observation.id().to_string(), observation);
    }

    pub fn record_published(&self, message: PublishedMessage) {
        self.record(Observation::Published(message));
    }

    pub fn record_consumed(&self, message: ConsumedMessage) {
        self.record(Observation::Consumed(message));
    }

    pub fn record_committed(&self, message: CommittedMessage) {
        self.record(Observation::Committed(message));
    }

    pub fn record_acknowledged(&self, message: AcknowledgedMessage) {
        self.record(Observation::Acknowledged(message));
    }

    pub fn record_retry(&self, message: ConsumedMessage) {
        self.record(Observation::Retried(message));
    }

    pub fn record_failure(&self, message: FailedMessage) {
        self.record(Observation::Failed(message));
    }

    fn advance_watermark(&self, commit: &CommittedMessage) {
        self.watermarks
            .entry((commit.topic.clone(), commit.partition))
            .and_modify(|highest| {
                if commit.offset > *highest {
                    *highest = commit.offset;
                }
            })
            .or_insert(commit.offset);
    }

    // ==================== Queries ====================

    /// Point-in-time copy of every record of `kind`. Unordered.
    pub fn snapshot(&self, kind: RecordKind) -> Vec<Observation> {
        self.bucket(kind)
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self, kind: RecordKind) -> usize {
        self.bucket(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(DashMap::is_empty)
    }

    /// `true` once some commit for `(topic, partition)` reached `offset + 1`.
    ///
    /// Never flips back: the watermark only advances.
    pub fn is_committed(&self, topic: &str, partition: i32, offset: i64) -> bool {
        self.watermarks
            .get(&(topic.to_string(), partition))
            .is_some_and(|highest| offset < *highest)
    }

    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.snapshot(RecordKind::Published)
            .into_iter()
            .filter_map(|o| match o {
                Observation::Published(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn consumed_messages(&self) -> Vec<ConsumedMessage> {
        self.snapshot(RecordKind::Consumed)
            .into_iter()
            .filter_map(|o| match o {
                Observation::Consumed(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn committed_messages(&self) -> Vec<CommittedMessage> {
        self.snapshot(RecordKind::Committed)
            .into_iter()
            .filter_map(|o| match o {
                Observation::Committed(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn acknowledged_messages(&self) -> Vec<AcknowledgedMessage> {
        self.snapshot(RecordKind::Acknowledged)
            .into_iter()
            .filter_map(|o| match o {
                Observation::Acknowledged(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn retried_messages(&self) -> Vec<ConsumedMessage> {
        self.snapshot(RecordKind::Retried)
            .into_iter()
            .filter_map(|o| match o {
                Observation::Retried(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn failed_messages(&self) -> Vec<FailedMessage> {
        self.snapshot(RecordKind::Failed)
            .into_iter()
            .filter_map(|o| match o {
                Observation::Failed(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    // ==================== Reporting ====================

    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            published: self.len(RecordKind::Published),
            consumed: self.len(RecordKind::Consumed),
            committed: self.len(RecordKind::Committed),
            acknowledged: self.len(RecordKind::Acknowledged),
            retried: self.len(RecordKind::Retried),
            failed: self.len(RecordKind::Failed),
        }
    }

    /// Human-readable listing of every record of `kind`.
    pub fn dump(&self, kind: RecordKind) -> String {
        let records = self.snapshot(kind);
        if records.is_empty() {
            return format!("{kind} so far: (none)");
        }
        let mut out = format!("{kind} so far ({}):", records.len());
        for record in &records {
            let _ = write!(out, "\n  {record}");
        }
        out
    }

    /// Drop everything. Only between test cases, never while polling.
    pub fn clear(&self) {
        for bucket in &self.buckets {
            bucket.clear();
        }
        self.watermarks.clear();
        tracing::debug!("observation store cleared");
    }
}

/// Per-kind record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub published: usize,
    pub consumed: usize,
    pub committed: usize,
    pub acknowledged: usize,
    pub retried: usize,
    pub failed: usize,
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "published={} consumed={} committed={} acknowledged={} retried={} failed={}",
            self.published, self.consumed, self.committed, self.acknowledged, self.retried, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use observer_api::FailureReason;

    use super::*;

    fn consumed(topic: &str, partition: i32, offset: i64) -> ConsumedMessage {
        ConsumedMessage::new(topic, partition, offset, b"{}".to_vec())
    }

    #[test]
    fn empty_store_yields_empty_snapshots() {
        let store = ObservationStore::new();
        for kind in RecordKind::ALL {
            assert!(store.snapshot(kind).is_empty());
        }
        assert!(store.is_empty());
        assert!(!store.is_committed("t", 0, 0));
    }

    #[test]
    fn records_land_in_their_own_bucket() {
        let store = ObservationStore::new();
        store.record_consumed(consumed("orders", 0, 0));
        store.record_retry(consumed("orders.retry", 0, 0));
        store.record_published(PublishedMessage::new("events", b"1".to_vec()));

        assert_eq!(store.consumed_messages().len(), 1);
        assert_eq!(store.retried_messages().len(), 1);
        assert_eq!(store.published_messages().len(), 1);
        assert!(store.failed_messages().is_empty());
        assert_eq!(
            store.summary(),
            StoreSummary { published: 1, consumed: 1, retried: 1, ..StoreSummary::default() }
        );
    }

    #[test]
    fn same_id_is_stored_once() {
        let store = ObservationStore::new();
        let message = consumed("orders", 0, 0);
        store.record_consumed(message.clone());
        store.record_consumed(message);
        assert_eq!(store.len(RecordKind::Consumed), 1);
    }

    #[test]
    fn commit_covers_offsets_strictly_below() {
        let store = ObservationStore::new();
        store.record_consumed(consumed("t", 0, 0));
        store.record_consumed(consumed("t", 0, 1));
        store.record_committed(CommittedMessage::new("t", 0, 1));

        assert!(store.is_committed("t", 0, 0));
        assert!(!store.is_committed("t", 0, 1));

        store.record_committed(CommittedMessage::new("t", 0, 2));
        assert!(store.is_committed("t", 0, 1));
        assert!(!store.is_committed("t", 0, 2));
    }

    #[test]
    fn commit_is_scoped_to_topic_and_partition() {
        let store = ObservationStore::new();
        store.record_committed(CommittedMessage::new("t", 0, 10));
        assert!(!store.is_committed("t", 1, 0));
        assert!(!store.is_committed("u", 0, 0));
    }

    #[test]
    fn lower_commit_never_regresses() {
        let store = ObservationStore::new();
        store.record_committed(CommittedMessage::new("t", 0, 5));
        assert!(store.is_committed("t", 0, 4));

        store.record_committed(CommittedMessage::new("t", 0, 2));
        assert!(store.is_committed("t", 0, 4));
        assert_eq!(store.committed_messages().len(), 2);
    }

    #[test]
    fn clear_drops_everything() {
        let store = ObservationStore::new();
        store.record_consumed(consumed("t", 0, 0));
        store.record_committed(CommittedMessage::new("t", 0, 1));
        store.clear();
        assert!(store.is_empty());
        assert!(!store.is_committed("t", 0, 0));
    }

    #[test]
    fn dump_names_kind_even_when_empty() {
        let store = ObservationStore::new();
        assert_eq!(store.dump(RecordKind::Failed), "failed so far: (none)");

        store.record_failure(FailedMessage::from_consumed(
            consumed("orders.error", 0, 3),
            FailureReason::new("Boom", "bad input"),
        ));
        let dump = store.dump(RecordKind::Failed);
        assert!(dump.starts_with("failed so far (1):"));
        assert!(dump.contains("orders.error"));
        assert!(dump.contains("Boom: bad input"));
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Arc::new(ObservationStore::new());
        let writers: Vec<_> = (0..8)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        store.record_consumed(consumed("load", w, i));
                        store.record_committed(CommittedMessage::new("load", w, i + 1));
                    }
                })
            })
            .collect();
        let reader = {
            let store = store.clone();
            thread::spawn(move || {
                let mut last = 0;
                for _ in 0..200 {
                    let seen = store.snapshot(RecordKind::Consumed).len();
                    assert!(seen >= last);
                    last = seen;
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(store.len(RecordKind::Consumed), 8 * 250);
        for partition in 0..8 {
            assert!(store.is_committed("load", partition, 249));
            assert!(!store.is_committed("load", partition, 250));
        }
    }

    #[test]
    fn summary_serializes_as_counts() {
        let store = ObservationStore::new();
        store.record_acknowledged(AcknowledgedMessage::new("t", Vec::new()));
        let json = serde_json::to_value(store.summary()).unwrap();
        assert_eq!(json["acknowledged"], 1);
        assert_eq!(json["consumed"], 0);
    }
}
