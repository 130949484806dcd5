use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::{LabelSet, Timestamp};

/// One grouping of entries sharing an (already batch-id-injected) label set.
///
/// Invariant: after [`Batch::sort`], `entries` is non-decreasing in
/// timestamp and `out_of_order` is `false`. The sort is stable on equal
/// timestamps, so insertion order is preserved between ties.
#[derive(Clone, Debug, Default)]
pub struct Stream {
    pub labels: LabelSet,
    pub entries: Vec<(Timestamp, Vec<u8>)>,
    last_timestamp: Timestamp,
    out_of_order: bool,
}

impl Stream {
    fn new(labels: LabelSet) -> Self {
        Self {
            labels,
            entries: Vec::new(),
            last_timestamp: Timestamp::default(),
            out_of_order: false,
        }
    }

    pub fn out_of_order(&self) -> bool {
        self.out_of_order
    }

    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }

    fn push(&mut self, ts: Timestamp, line: Vec<u8>) {
        if !self.entries.is_empty() && ts < self.last_timestamp {
            self.out_of_order = true;
        } else {
            self.last_timestamp = ts;
        }
        self.entries.push((ts, line));
    }

    fn sort(&mut self) {
        if !self.out_of_order {
            return;
        }
        // `sort_by_key` is a stable sort: entries with equal timestamps keep
        // their relative (insertion) order.
        self.entries.sort_by_key(|(ts, _)| *ts);
        self.out_of_order = false;
    }
}

/// A group of streams accumulated between flushes, plus the bookkeeping the
/// `BatchProcessor` needs to decide when to ship it.
#[derive(Debug)]
pub struct Batch {
    id: u64,
    id_label_name: String,
    streams: HashMap<LabelSet, Stream>,
    bytes: usize,
    created_at: Instant,
}

impl Batch {
    pub fn new(id: u64, id_label_name: impl Into<String>) -> Self {
        Self {
            id,
            id_label_name: id_label_name.into(),
            streams: HashMap::new(),
            bytes: 0,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Appends `line` under the stream identified by `labels`, creating the
    /// stream (with the batch-id label injected) on first use.
    ///
    /// The injected label is what lets the backend treat concurrent
    /// in-flight batches as distinct streams, so it tolerates out-of-order
    /// timestamps *between* batches sharing the caller's original labels.
    /// This must never be optimised away.
    pub fn add(&mut self, labels: &LabelSet, ts: Timestamp, line: Vec<u8>) {
        self.bytes += line.len();
        let stream = self.streams.entry(labels.clone()).or_insert_with(|| {
            let injected = labels.with_injected(&self.id_label_name, &self.id.to_string());
            Stream::new(injected)
        });
        stream.push(ts, line);
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes
    }

    pub fn size_bytes_after(&self, line: &[u8]) -> usize {
        self.bytes + line.len()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.streams.values().map(|s| s.entries.len()).count()
    }

    /// Stably sorts every stream whose entries arrived out of order. A no-op
    /// for streams that never observed an out-of-order append.
    pub fn sort(&mut self) {
        for stream in self.streams.values_mut() {
            stream.sort();
        }
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    pub fn into_streams(self) -> impl Iterator<Item = Stream> {
        self.streams.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(n: i64) -> Timestamp {
        Timestamp::from_nanos(n)
    }

    #[test]
    fn add_injects_batch_id_label_once_per_stream() {
        let mut batch = Batch::new(0, "id");
        let labels = LabelSet::from_pairs([("app", "a")]);
        batch.add(&labels, ts(1), b"one".to_vec());
        batch.add(&labels, ts(2), b"two".to_vec());

        assert_eq!(batch.streams().count(), 1);
        let stream = batch.streams().next().unwrap();
        assert_eq!(stream.labels.get("id"), Some("0"));
        assert_eq!(stream.labels.get("app"), Some("a"));
        assert_eq!(stream.entries.len(), 2);
        assert_eq!(batch.size_bytes(), 6);
    }

    #[test]
    fn two_batch_ids_keep_identical_labels_as_distinct_streams() {
        let labels = LabelSet::from_pairs([("app", "a")]);

        let mut batch0 = Batch::new(0, "id");
        batch0.add(&labels, ts(1), b"x".to_vec());
        let mut batch1 = Batch::new(1, "id");
        batch1.add(&labels, ts(1), b"y".to_vec());

        let s0 = batch0.streams().next().unwrap();
        let s1 = batch1.streams().next().unwrap();
        assert_ne!(s0.labels, s1.labels);
        assert_eq!(s0.labels.get("id"), Some("0"));
        assert_eq!(s1.labels.get("id"), Some("1"));
    }

    #[test]
    fn out_of_order_entries_are_stably_sorted() {
        let mut batch = Batch::new(0, "id");
        let labels = LabelSet::from_pairs([("app", "a")]);
        batch.add(&labels, ts(20), b"B".to_vec());
        batch.add(&labels, ts(10), b"A".to_vec());
        batch.add(&labels, ts(30), b"C".to_vec());

        let stream = batch.streams().next().unwrap();
        assert!(stream.out_of_order());

        batch.sort();
        let stream = batch.streams().next().unwrap();
        assert!(!stream.out_of_order());
        assert_eq!(
            stream.entries,
            vec![
                (ts(10), b"A".to_vec()),
                (ts(20), b"B".to_vec()),
                (ts(30), b"C".to_vec()),
            ]
        );
    }

    #[test]
    fn sort_is_noop_when_never_out_of_order() {
        let mut batch = Batch::new(0, "id");
        let labels = LabelSet::from_pairs([("app", "a")]);
        batch.add(&labels, ts(1), b"A".to_vec());
        batch.add(&labels, ts(2), b"B".to_vec());
        batch.sort();
        let stream = batch.streams().next().unwrap();
        assert_eq!(
            stream.entries,
            vec![(ts(1), b"A".to_vec()), (ts(2), b"B".to_vec())]
        );
    }

    #[test]
    fn stable_sort_preserves_insertion_order_on_ties() {
        let mut batch = Batch::new(0, "id");
        let labels = LabelSet::from_pairs([("app", "a")]);
        batch.add(&labels, ts(5), b"A".to_vec());
        batch.add(&labels, ts(3), b"B".to_vec()); // triggers out_of_order
        batch.add(&labels, ts(3), b"C".to_vec()); // tie with B
        batch.sort();
        let stream = batch.streams().next().unwrap();
        assert_eq!(
            stream.entries,
            vec![
                (ts(3), b"B".to_vec()),
                (ts(3), b"C".to_vec()),
                (ts(5), b"A".to_vec()),
            ]
        );
    }

    #[test]
    fn bytes_counts_only_line_length() {
        let mut batch = Batch::new(7, "id");
        let labels = LabelSet::from_pairs([("a", "1"), ("b", "2")]);
        batch.add(&labels, ts(1), b"hello".to_vec());
        assert_eq!(batch.size_bytes(), 5);
        assert_eq!(batch.size_bytes_after(b"!!"), 7);
    }
}
