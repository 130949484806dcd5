use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flog_core::config::{BatchProcessorConfig, RetryConfig};
use flog_core::{Batch, LogEntry};
use flog_metrics::RouterMetrics;
use flog_queue::{DurableQueue, PopOutcome, QueueEntry};
use flog_sink::{ExportOutcome, Sink, SinkError};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::PipelineError;
use crate::throttle::Throttle;

/// The label name injected into a `Stream`'s labels to carry its rotating
/// batch id, unless the owning `OutputClient` is given a different one.
pub const DEFAULT_ID_LABEL_NAME: &str = "id";

struct Tasks {
    writer: JoinHandle<()>,
    accumulator: JoinHandle<()>,
    flushers: Vec<JoinHandle<()>>,
}

/// Durable buffering, accumulation, flushing, retry and throttling between
/// an enqueue API and one [`Sink`].
///
/// Three task families cooperate over two channels:
/// - `enqueue` hands entries to a bounded arrival channel; a writer task
///   drains it into the [`DurableQueue`] (the arrival channel, not the
///   queue, is what `max_queue_size` bounds — the queue itself never
///   blocks on capacity).
/// - An accumulator task (run on a blocking thread, since
///   `DurableQueue::pop_blocking` is a blocking call) pops entries, builds
///   `Batch`es, and ships a batch to the flush channel once it reaches
///   `max_batch_size` or `export_interval` age.
/// - One or more flusher tasks pull batches off the flush channel, sort,
///   throttle, and call `Sink::export` with retry.
pub struct BatchProcessor {
    arrival_tx: mpsc::Sender<LogEntry>,
    stopped: AtomicBool,
    stop_notify: Arc<Notify>,
    tasks: Mutex<Option<Tasks>>,
}

impl BatchProcessor {
    pub fn spawn(
        config: BatchProcessorConfig,
        id_label_name: impl Into<String>,
        queue: Arc<DurableQueue>,
        sink: Arc<dyn Sink>,
        metrics: Option<Arc<RouterMetrics>>,
    ) -> Arc<Self> {
        let id_label_name = id_label_name.into();
        let (arrival_tx, arrival_rx) = mpsc::channel(config.max_queue_size.max(1));
        let flusher_count = config.export_buffer_size.max(1);
        let (flush_tx, flush_rx) = mpsc::channel(flusher_count);
        let flush_rx = Arc::new(Mutex::new(flush_rx));
        let stop_notify = Arc::new(Notify::new());

        let writer = tokio::spawn(run_writer(
            arrival_rx,
            queue.clone(),
            stop_notify.clone(),
            metrics.clone(),
        ));

        let accumulator = tokio::task::spawn_blocking({
            let queue = queue.clone();
            let metrics = metrics.clone();
            let max_batch_size = config.max_batch_size;
            let export_interval = config.export_interval;
            let num_batch_ids = config.num_batch_ids.max(1);
            let id_label_name = id_label_name.clone();
            move || {
                run_accumulator(
                    queue,
                    flush_tx,
                    max_batch_size,
                    export_interval,
                    num_batch_ids,
                    id_label_name,
                    metrics,
                )
            }
        });

        let throttle = Arc::new(Throttle::new(
            config.throttle.enabled,
            config.throttle.requests_per_sec,
        ));
        let retry = Arc::new(config.retry.clone());
        let flushers = (0..flusher_count)
            .map(|_| {
                tokio::spawn(run_flusher(
                    flush_rx.clone(),
                    sink.clone(),
                    retry.clone(),
                    throttle.clone(),
                    config.export_timeout,
                    metrics.clone(),
                ))
            })
            .collect();

        Arc::new(Self {
            arrival_tx,
            stopped: AtomicBool::new(false),
            stop_notify,
            tasks: Mutex::new(Some(Tasks {
                writer,
                accumulator,
                flushers,
            })),
        })
    }

    /// Accepts `entry` for eventual delivery. Returns `Ok(())` both when the
    /// entry was accepted and when it was dropped for a full arrival buffer
    /// (logged, not treated as caller-visible failure — the queue, not this
    /// buffer, is the durability boundary); only a stopped processor is an
    /// error.
    pub async fn enqueue(&self, entry: LogEntry) -> Result<(), PipelineError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PipelineError::Stopped);
        }
        if let Err(err) = self.arrival_tx.try_send(entry) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("arrival buffer full, dropping entry");
                }
                mpsc::error::TrySendError::Closed(_) => return Err(PipelineError::Stopped),
            }
        }
        Ok(())
    }

    /// Stops accepting new entries and signals the writer task to drain
    /// whatever is already buffered, then close the queue. Returns
    /// immediately; call [`BatchProcessor::stop_wait`] to block for drain.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.stop_notify.notify_one();
    }

    /// Blocks until the writer, accumulator and all flusher tasks have
    /// exited. A no-op if called more than once.
    pub async fn stop_wait(&self) {
        let tasks = self.tasks.lock().await.take();
        let Some(tasks) = tasks else { return };
        if let Err(err) = tasks.writer.await {
            error!(%err, "batch processor writer task panicked");
        }
        if let Err(err) = tasks.accumulator.await {
            error!(%err, "batch processor accumulator task panicked");
        }
        for flusher in tasks.flushers {
            if let Err(err) = flusher.await {
                error!(%err, "batch processor flusher task panicked");
            }
        }
    }
}

async fn run_writer(
    mut arrival_rx: mpsc::Receiver<LogEntry>,
    queue: Arc<DurableQueue>,
    stop_notify: Arc<Notify>,
    metrics: Option<Arc<RouterMetrics>>,
) {
    loop {
        tokio::select! {
            maybe_entry = arrival_rx.recv() => {
                match maybe_entry {
                    Some(entry) => push_one(&queue, entry, &metrics).await,
                    None => break,
                }
            }
            _ = stop_notify.notified() => {
                while let Ok(entry) = arrival_rx.try_recv() {
                    push_one(&queue, entry, &metrics).await;
                }
                break;
            }
        }
    }
    queue.close();
}

async fn push_one(queue: &Arc<DurableQueue>, entry: LogEntry, metrics: &Option<Arc<RouterMetrics>>) {
    let queue_entry = QueueEntry::new(entry.labels, entry.timestamp, entry.line);
    let queue = queue.clone();
    let result = tokio::task::spawn_blocking(move || {
        let outcome = queue.push(&queue_entry);
        (outcome, queue.len())
    })
    .await;
    match result {
        Ok((Ok(()), len)) => {
            if let Some(m) = metrics {
                m.enqueued_total.inc();
                m.queue_size.set(len as i64);
            }
        }
        Ok((Err(err), _)) => {
            // No retry step exists between the arrival buffer and the
            // durable queue (spec's retry budget applies to sink export
            // only); a push failure here is a disk problem the backoff
            // loop below can't help with, so it's logged and dropped.
            error!(error = %err, "failed to persist entry to durable queue, dropping");
        }
        Err(err) => error!(%err, "durable queue push task panicked"),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_accumulator(
    queue: Arc<DurableQueue>,
    flush_tx: mpsc::Sender<Batch>,
    max_batch_size: usize,
    export_interval: Duration,
    num_batch_ids: u64,
    id_label_name: String,
    metrics: Option<Arc<RouterMetrics>>,
) {
    let mut counter: u64 = 0;
    let mut current: Option<Batch> = None;

    loop {
        let outcome = if current.is_some() {
            queue.pop_blocking_timeout(export_interval)
        } else {
            match queue.pop_blocking() {
                Some(entry) => PopOutcome::Entry(entry),
                None => PopOutcome::Closed,
            }
        };

        match outcome {
            PopOutcome::Entry(entry) => {
                if let Some(m) = &metrics {
                    m.dequeued_total.inc();
                    m.queue_size.set(queue.len() as i64);
                }
                let batch = current.get_or_insert_with(|| {
                    let id = counter;
                    counter = (counter + 1) % num_batch_ids;
                    Batch::new(id, id_label_name.clone())
                });
                batch.add(&entry.labels, entry.timestamp, entry.line);
                if batch.entry_count() >= max_batch_size || batch.age() >= export_interval {
                    if let Some(ready) = current.take() {
                        if flush_tx.blocking_send(ready).is_err() {
                            break;
                        }
                    }
                }
            }
            PopOutcome::TimedOut => {
                if let Some(batch) = current.take() {
                    if flush_tx.blocking_send(batch).is_err() {
                        break;
                    }
                }
            }
            PopOutcome::Closed => {
                if let Some(batch) = current.take() {
                    let _ = flush_tx.blocking_send(batch);
                }
                break;
            }
        }
    }
}

async fn run_flusher(
    flush_rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
    sink: Arc<dyn Sink>,
    retry: Arc<RetryConfig>,
    throttle: Arc<Throttle>,
    export_timeout: Duration,
    metrics: Option<Arc<RouterMetrics>>,
) {
    loop {
        let mut batch = {
            let mut rx = flush_rx.lock().await;
            match rx.recv().await {
                Some(batch) => batch,
                None => break,
            }
        };
        batch.sort();
        throttle.acquire().await;
        export_with_retry(&*sink, &batch, &retry, export_timeout, &metrics).await;
    }
}

async fn export_with_retry(
    sink: &dyn Sink,
    batch: &Batch,
    retry: &RetryConfig,
    export_timeout: Duration,
    metrics: &Option<Arc<RouterMetrics>>,
) {
    let started_at = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let call_started = Instant::now();
        let outcome = match tokio::time::timeout(export_timeout, sink.export(batch)).await {
            Ok(outcome) => outcome,
            Err(_) => ExportOutcome::Retryable(SinkError::Transport(
                "export timed out".to_string(),
            )),
        };
        if let Some(m) = metrics {
            m.export_duration_seconds
                .observe(call_started.elapsed().as_secs_f64());
        }

        match outcome {
            ExportOutcome::Ok => return,
            ExportOutcome::Permanent(err) => {
                warn!(
                    endpoint = sink.endpoint(),
                    batch_id = batch.id(),
                    error = %err,
                    "dropping batch after permanent sink error"
                );
                if let Some(m) = metrics {
                    m.export_errors_total.inc();
                }
                return;
            }
            ExportOutcome::Retryable(err) => {
                if !retry.enabled || started_at.elapsed() >= retry.max_elapsed_time {
                    warn!(
                        endpoint = sink.endpoint(),
                        batch_id = batch.id(),
                        error = %err,
                        "dropping batch after exhausting retry budget"
                    );
                    if let Some(m) = metrics {
                        m.export_errors_total.inc();
                    }
                    return;
                }
                let wait = backoff_for(attempt, retry);
                attempt += 1;
                tokio::time::sleep(wait).await;
            }
        }
    }
}

fn backoff_for(attempt: u32, retry: &RetryConfig) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
    retry
        .initial_interval
        .checked_mul(factor)
        .unwrap_or(retry.max_interval)
        .min(retry.max_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flog_core::{LabelSet, Timestamp};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify as TestNotify;

    struct CountingSink {
        exports: AtomicUsize,
        notify: TestNotify,
        endpoint: String,
    }

    impl CountingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                exports: AtomicUsize::new(0),
                notify: TestNotify::new(),
                endpoint: "test://counting".to_string(),
            })
        }
    }

    #[async_trait]
    impl Sink for CountingSink {
        async fn export(&self, _batch: &Batch) -> ExportOutcome {
            self.exports.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
            ExportOutcome::Ok
        }

        fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    fn test_entry(n: i64) -> LogEntry {
        LogEntry::new(
            Timestamp::from_nanos(n),
            LabelSet::from_pairs([("app", "demo")]),
            format!("line-{n}").into_bytes(),
        )
    }

    #[tokio::test]
    async fn enqueued_entries_eventually_reach_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path(), 100, false).unwrap());
        let sink = CountingSink::new();
        let mut config = BatchProcessorConfig::default();
        config.max_batch_size = 2;
        config.export_interval = Duration::from_millis(50);

        let processor = BatchProcessor::spawn(config, "id", queue, sink.clone(), None);
        processor.enqueue(test_entry(1)).await.unwrap();
        processor.enqueue(test_entry(2)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), sink.notify.notified())
            .await
            .expect("sink should have been called");
        assert!(sink.exports.load(Ordering::SeqCst) >= 1);

        processor.stop();
        processor.stop_wait().await;
    }

    #[tokio::test]
    async fn stop_wait_drains_buffered_entries_before_exiting() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path(), 100, false).unwrap());
        let sink = CountingSink::new();
        let mut config = BatchProcessorConfig::default();
        config.export_interval = Duration::from_millis(20);

        let processor = BatchProcessor::spawn(config, "id", queue, sink.clone(), None);
        for i in 0..5 {
            processor.enqueue(test_entry(i)).await.unwrap();
        }
        processor.stop();
        processor.stop_wait().await;

        assert!(sink.exports.load(Ordering::SeqCst) >= 1);
        assert!(matches!(
            processor.enqueue(test_entry(99)).await,
            Err(PipelineError::Stopped)
        ));
    }

    #[tokio::test]
    async fn permanent_sink_error_drops_batch_without_retry() {
        struct AlwaysPermanent;
        #[async_trait]
        impl Sink for AlwaysPermanent {
            async fn export(&self, _batch: &Batch) -> ExportOutcome {
                ExportOutcome::Permanent(SinkError::Rejected("schema".to_string()))
            }
            fn endpoint(&self) -> &str {
                "test://permanent"
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path(), 100, false).unwrap());
        let mut config = BatchProcessorConfig::default();
        config.export_interval = Duration::from_millis(20);

        let processor = BatchProcessor::spawn(config, "id", queue, Arc::new(AlwaysPermanent), None);
        processor.enqueue(test_entry(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        processor.stop();
        processor.stop_wait().await;
    }
}
