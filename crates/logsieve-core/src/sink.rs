use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use logsieve_types::{ChangeEvent, Record};

use crate::filter::RecordFilter;
use crate::tree::LoggerTree;

/// Default record buffer capacity.
pub const DEFAULT_CAPACITY: usize = 5000;

/// Counters reported by [`EventSink::stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Total records ever submitted
    pub received: u64,

    /// Records lost to eviction or to a paused sink
    pub dropped: u64,

    /// Records currently buffered
    pub buffered: usize,

    /// Whether the sink is paused
    pub paused: bool,
}

/// Thread-safe bounded buffer of decoded records, newest first.
///
/// Submitting a record registers its logger with the namespace tree and
/// appends it to the buffer. Queries evaluate the namespace, level and
/// search filters against the live tree, so toggling a subtree immediately
/// changes what a query returns. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EventSink {
    /// Buffered records, newest at the front
    records: Arc<RwLock<VecDeque<Record>>>,

    /// Logger namespace registry
    tree: LoggerTree,

    /// Level strings seen so far, verbatim
    levels: Arc<RwLock<BTreeSet<String>>>,

    /// While set, submissions are ignored and the view stays frozen
    paused: Arc<AtomicBool>,

    /// Maximum buffered records
    capacity: usize,

    /// Total records submitted
    received: Arc<AtomicU64>,

    /// Records lost to eviction or pause
    dropped: Arc<AtomicU64>,

    /// Change notification channel, if wired up
    notifier: Arc<RwLock<Option<mpsc::UnboundedSender<ChangeEvent>>>>,
}

impl EventSink {
    /// Create a sink with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.max(1)))),
            tree: LoggerTree::new(),
            levels: Arc::new(RwLock::new(BTreeSet::new())),
            paused: Arc::new(AtomicBool::new(false)),
            capacity: capacity.max(1),
            received: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            notifier: Arc::new(RwLock::new(None)),
        }
    }

    /// Wire up change notifications for both the sink and its tree.
    pub fn set_notifier(&self, tx: mpsc::UnboundedSender<ChangeEvent>) {
        self.tree.set_notifier(tx.clone());
        *self.notifier.write() = Some(tx);
    }

    /// Handle to the namespace tree shared by this sink.
    pub fn tree(&self) -> LoggerTree {
        self.tree.clone()
    }

    /// Accept one decoded record.
    ///
    /// Registers the record's logger, remembers its level string and pushes
    /// it to the front of the buffer. When the buffer grows past capacity an
    /// interior block is evicted so a sustained burst does not shift the
    /// most recent records on every insert. While paused this is a no-op
    /// apart from the received counter.
    pub fn submit(&self, record: Record) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if self.paused.load(Ordering::Relaxed) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if self.tree.register(&record.logger) {
            self.notify(ChangeEvent::LoggerAdded(record.logger.clone()));
        }
        self.levels.write().insert(record.level.clone());

        let announce = if self.notifier.read().is_some() {
            Some(record.clone())
        } else {
            None
        };

        let evicted = {
            let mut records = self.records.write();
            records.push_front(record);
            if records.len() > self.capacity {
                let cut = (self.capacity * 2 / 5).max(1);
                let start = self.capacity.saturating_sub(cut).max(1);
                let end = (start + cut).min(records.len());
                records.drain(start..end);
                end - start
            } else {
                0
            }
        };
        if evicted > 0 {
            self.dropped.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(evicted, "trimmed interior block from record buffer");
        }

        if let Some(record) = announce {
            self.notify(ChangeEvent::RecordAppended(record));
        }
    }

    /// Records passing the namespace, level and search filters, newest
    /// first. Pure view; the buffer is not mutated.
    pub fn query(&self, filter: &RecordFilter) -> Vec<Record> {
        self.records
            .read()
            .iter()
            .filter(|r| self.tree.is_enabled(&r.logger) && filter.matches(r))
            .cloned()
            .collect()
    }

    /// All buffered records, newest first, ignoring filters.
    pub fn all(&self) -> Vec<Record> {
        self.records.read().iter().cloned().collect()
    }

    /// Empty the buffer and forget seen levels. Tree state is kept so
    /// enable/disable choices survive a clear.
    pub fn clear(&self) {
        self.records.write().clear();
        self.levels.write().clear();
        debug!("cleared record buffer");
        self.notify(ChangeEvent::BufferCleared);
    }

    /// Freeze or unfreeze the sink.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Level strings seen since the last clear, sorted.
    pub fn levels(&self) -> Vec<String> {
        self.levels.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            buffered: self.len(),
            paused: self.is_paused(),
        }
    }

    fn notify(&self, event: ChangeEvent) {
        if let Some(tx) = self.notifier.read().as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: &str, logger: &str, message: &str) -> Record {
        Record::new(level, logger, message)
    }

    #[test]
    fn test_submit_buffers_newest_first() {
        let sink = EventSink::new(10);
        sink.submit(record("INFO", "A", "first"));
        sink.submit(record("INFO", "A", "second"));
        sink.submit(record("INFO", "A", "third"));

        let messages: Vec<String> = sink.all().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_submit_registers_logger_and_level() {
        let sink = EventSink::new(10);
        sink.submit(record("WARN", "App.Db.Pool", "m"));

        assert_eq!(sink.tree().len(), 3);
        assert_eq!(sink.levels(), vec!["WARN"]);
    }

    #[test]
    fn test_interior_eviction_keeps_newest_block() {
        // capacity 5: evicts 2 records starting at offset 3
        let sink = EventSink::new(5);
        for i in 1..=6 {
            sink.submit(record("INFO", "A", &format!("m{i}")));
        }

        let messages: Vec<String> = sink.all().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["m6", "m5", "m4", "m1"]);
        assert_eq!(sink.stats().dropped, 2);
    }

    #[test]
    fn test_default_capacity_eviction() {
        let sink = EventSink::default();
        for i in 0..=5000u32 {
            sink.submit(record("INFO", "Load", &format!("m{i}")));
        }

        let all = sink.all();
        assert!(all.len() <= DEFAULT_CAPACITY);
        assert_eq!(all.len(), 3001);
        // the 3000 most recent submissions survive intact
        assert_eq!(all[0].message, "m5000");
        assert_eq!(all[2999].message, "m2001");
        // plus the single oldest record beyond the evicted block
        assert_eq!(all[3000].message, "m0");
    }

    #[test]
    fn test_paused_sink_ignores_submissions() {
        let sink = EventSink::new(10);
        sink.submit(record("INFO", "A", "kept"));

        sink.set_paused(true);
        sink.submit(record("INFO", "B", "ignored"));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.tree().len(), 1);

        sink.set_paused(false);
        sink.submit(record("INFO", "B", "resumed"));
        assert_eq!(sink.len(), 2);

        let stats = sink.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_query_honors_disabled_namespace() {
        let sink = EventSink::new(10);
        sink.submit(record("INFO", "App.Db", "db up"));
        sink.submit(record("INFO", "App.Http", "http up"));

        sink.tree().set_state("App.Db", false);

        let hits = sink.query(&RecordFilter::new());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].logger, "App.Http");

        // search text cannot resurrect a disabled namespace
        let hits = sink.query(&RecordFilter::new().with_search("db up"));
        assert!(hits.is_empty());
    }

    #[test]
    fn test_query_is_live_against_tree() {
        let sink = EventSink::new(10);
        sink.submit(record("INFO", "App.Db", "m"));

        sink.tree().set_state("App.Db", false);
        assert!(sink.query(&RecordFilter::new()).is_empty());

        sink.tree().set_state("App.Db", true);
        assert_eq!(sink.query(&RecordFilter::new()).len(), 1);
    }

    #[test]
    fn test_query_applies_level_and_search() {
        let sink = EventSink::new(10);
        sink.submit(record("INFO", "A", "alpha"));
        sink.submit(record("ERROR", "A", "beta"));
        sink.submit(record("ERROR", "A", "alpha again"));

        let filter = RecordFilter::new().with_levels(["ERROR"]).with_search("alpha");
        let hits = sink.query(&filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message, "alpha again");
    }

    #[test]
    fn test_clear_keeps_tree_state() {
        let sink = EventSink::new(10);
        sink.submit(record("INFO", "App.Db", "m"));
        sink.tree().set_state("App.Db", false);

        sink.clear();

        assert!(sink.is_empty());
        assert!(sink.levels().is_empty());
        assert_eq!(sink.tree().len(), 2);
        assert!(!sink.tree().is_enabled("App.Db"));
    }

    #[test]
    fn test_change_notifications() {
        let sink = EventSink::new(10);
        let (tx, mut rx) = mpsc::unbounded_channel();
        sink.set_notifier(tx);

        sink.submit(record("INFO", "A.B", "m1"));
        assert_eq!(
            rx.try_recv().unwrap(),
            ChangeEvent::LoggerAdded("A.B".to_string())
        );
        match rx.try_recv().unwrap() {
            ChangeEvent::RecordAppended(r) => assert_eq!(r.message, "m1"),
            other => panic!("unexpected event: {other:?}"),
        }

        // known logger: only the append is announced
        sink.submit(record("INFO", "A.B", "m2"));
        match rx.try_recv().unwrap() {
            ChangeEvent::RecordAppended(r) => assert_eq!(r.message, "m2"),
            other => panic!("unexpected event: {other:?}"),
        }

        sink.clear();
        assert_eq!(rx.try_recv().unwrap(), ChangeEvent::BufferCleared);
    }
}
