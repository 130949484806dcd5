use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cursor::Cursor;
use crate::entry::{read_row, QueueEntry, Row};
use crate::error::QueueError;
use crate::segment::{
    create_segment_for_write, cursor_path, open_segment_for_read, scan_rows,
    scan_segment_indices, segment_path, truncate_to, unlink_segment,
};

/// Outcome of [`DurableQueue::pop_blocking_timeout`].
#[derive(Debug)]
pub enum PopOutcome {
    Entry(QueueEntry),
    TimedOut,
    Closed,
}

struct WriterState {
    segment: u64,
    rows_in_segment: u64,
    file: File,
}

struct ReaderState {
    segment: u64,
    rows_consumed: u64,
    file: Option<std::io::BufReader<File>>,
}

/// A bounded-by-disk, on-disk FIFO of [`QueueEntry`] rows.
///
/// Entries are laid out across fixed-row-count segment files so that a
/// consumed segment can be dropped in one `unlink` rather than requiring
/// compaction; the reader's exact position survives a restart via a small
/// cursor file next to the segments. One `DurableQueue` is meant to be
/// shared by exactly one pusher population (safe to call `push` from many
/// threads) and exactly one `pop_blocking` caller, matching a single
/// `BatchProcessor`'s accumulator task.
pub struct DurableQueue {
    dir: PathBuf,
    segment_size: u64,
    sync: bool,
    writer: Mutex<WriterState>,
    reader: Mutex<ReaderState>,
    pending: Mutex<u64>,
    not_empty: Condvar,
    closed: AtomicBool,
}

impl DurableQueue {
    /// Opens (creating if absent) the queue rooted at `dir`, replaying
    /// whatever segments and cursor are already there.
    pub fn open(dir: impl Into<PathBuf>, segment_size: u64, sync: bool) -> Result<Self, QueueError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| QueueError::io(&dir, e))?;

        let segments = scan_segment_indices(&dir)?;
        let write_segment = segments.last().copied().unwrap_or(0);

        let (write_rows, valid_bytes) = scan_rows(&segment_path(&dir, write_segment))?;
        truncate_to(&segment_path(&dir, write_segment), valid_bytes).ok();
        let writer_file = create_segment_for_write(&dir, write_segment)?;

        let cursor = Cursor::read_or_default(&cursor_path(&dir))?;
        let read_segment = if segments.iter().any(|&s| s == cursor.segment) {
            cursor.segment
        } else {
            segments.first().copied().unwrap_or(write_segment)
        };
        let row_offset = if read_segment == cursor.segment {
            cursor.row_offset
        } else {
            0
        };

        let mut pending = 0u64;
        for &seg in &segments {
            if seg < read_segment || seg > write_segment {
                continue;
            }
            let total_rows = if seg == write_segment {
                write_rows
            } else {
                segment_size
            };
            let start_row = if seg == read_segment { row_offset } else { 0 };
            pending += total_rows.saturating_sub(start_row);
        }
        if segments.is_empty() {
            pending = 0;
        }

        Ok(Self {
            dir,
            segment_size,
            sync,
            writer: Mutex::new(WriterState {
                segment: write_segment,
                rows_in_segment: write_rows,
                file: writer_file,
            }),
            reader: Mutex::new(ReaderState {
                segment: read_segment,
                rows_consumed: row_offset,
                file: None,
            }),
            pending: Mutex::new(pending),
            not_empty: Condvar::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Appends one entry. Safe to call from multiple threads; serialised by
    /// an internal lock, matching the single-writer-from-many-callers model.
    pub fn push(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        let row = entry.encode()?;
        {
            let mut writer = self.writer.lock();
            let path = segment_path(&self.dir, writer.segment);
            writer.file.write_all(&row).map_err(|e| QueueError::io(&path, e))?;
            if self.sync {
                writer.file.sync_data().map_err(|e| QueueError::io(&path, e))?;
            } else {
                writer.file.flush().map_err(|e| QueueError::io(&path, e))?;
            }
            writer.rows_in_segment += 1;
            if writer.rows_in_segment >= self.segment_size {
                writer.segment += 1;
                writer.rows_in_segment = 0;
                writer.file = create_segment_for_write(&self.dir, writer.segment)?;
            }
        }
        *self.pending.lock() += 1;
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until an entry is available or the queue is closed, returning
    /// `None` only once closed with nothing left to drain.
    pub fn pop_blocking(&self) -> Option<QueueEntry> {
        match self.pop_inner(None) {
            PopOutcome::Entry(entry) => Some(entry),
            PopOutcome::Closed => None,
            PopOutcome::TimedOut => unreachable!("pop_inner(None) never times out"),
        }
    }

    /// Like [`DurableQueue::pop_blocking`], but gives up and returns
    /// [`PopOutcome::TimedOut`] after `timeout` if nothing arrived. Lets a
    /// caller building time-bounded batches (an `export_interval` forced
    /// flush) notice an aging, non-empty batch even while the queue is idle.
    pub fn pop_blocking_timeout(&self, timeout: Duration) -> PopOutcome {
        self.pop_inner(Some(timeout))
    }

    fn pop_inner(&self, timeout: Option<Duration>) -> PopOutcome {
        loop {
            {
                let mut pending = self.pending.lock();
                while *pending == 0 && !self.closed.load(Ordering::Acquire) {
                    match timeout {
                        None => self.not_empty.wait(&mut pending),
                        Some(d) => {
                            let result = self.not_empty.wait_for(&mut pending, d);
                            if result.timed_out() && *pending == 0 {
                                return PopOutcome::TimedOut;
                            }
                        }
                    }
                }
                if *pending == 0 {
                    return PopOutcome::Closed;
                }
            }

            let mut reader = self.reader.lock();
            match self.read_next_row(&mut reader) {
                Ok(Some(entry)) => {
                    let mut pending = self.pending.lock();
                    *pending = pending.saturating_sub(1);
                    drop(pending);
                    self.persist_cursor(&reader);
                    return PopOutcome::Entry(entry);
                }
                Ok(None) => {
                    // Writer hasn't caught up to its own flush yet; spin back
                    // to the condvar wait rather than busy-loop.
                    continue;
                }
                Err(err) => {
                    // An I/O failure below the length-prefix framing (missing
                    // segment file, read error) can't be skipped row by row;
                    // give up on the rest of this segment so a single bad
                    // segment doesn't spin the dequeuer forever.
                    tracing::error!(
                        error = %err,
                        segment = reader.segment,
                        "durable queue read failed, abandoning remainder of segment"
                    );
                    let remaining = self.segment_size.saturating_sub(reader.rows_consumed);
                    let mut pending = self.pending.lock();
                    *pending = pending.saturating_sub(remaining.max(1));
                    drop(pending);
                    reader.file = None;
                    reader.segment += 1;
                    reader.rows_consumed = 0;
                    self.persist_cursor(&reader);
                    continue;
                }
            }
        }
    }

    fn read_next_row(&self, reader: &mut ReaderState) -> Result<Option<QueueEntry>, QueueError> {
        loop {
            if reader.file.is_none() {
                let file = open_segment_for_read(&self.dir, reader.segment)?;
                reader.file = Some(std::io::BufReader::new(file));
            }
            let path = segment_path(&self.dir, reader.segment);
            let outcome = {
                let file = reader.file.as_mut().expect("just ensured present");
                read_row(file).map_err(|e| QueueError::io(&path, e))?
            };
            match outcome {
                None => return Ok(None),
                Some(Row::Entry(entry)) => {
                    reader.rows_consumed += 1;
                    self.maybe_advance_segment(reader)?;
                    return Ok(Some(entry));
                }
                Some(Row::Corrupt { reason }) => {
                    tracing::warn!(
                        segment = reader.segment,
                        reason,
                        "skipping corrupt queue row"
                    );
                    reader.rows_consumed += 1;
                    self.maybe_advance_segment(reader)?;
                    continue;
                }
            }
        }
    }

    /// A segment that has yielded exactly `segment_size` rows is, by
    /// construction, sealed: the writer only rolls over to a new segment
    /// file immediately after writing a segment's final row, so that file is
    /// guaranteed to already exist. Dropping the finished segment here keeps
    /// disk usage bounded to roughly the backlog size.
    fn maybe_advance_segment(&self, reader: &mut ReaderState) -> Result<(), QueueError> {
        if reader.rows_consumed < self.segment_size {
            return Ok(());
        }
        let finished = reader.segment;
        reader.file = None;
        reader.segment += 1;
        reader.rows_consumed = 0;
        unlink_segment(&self.dir, finished)
    }

    fn persist_cursor(&self, reader: &ReaderState) {
        let cursor = Cursor {
            segment: reader.segment,
            row_offset: reader.rows_consumed,
        };
        if let Err(err) = cursor.persist(&cursor_path(&self.dir), self.sync) {
            tracing::error!(error = %err, "failed to persist durable queue cursor");
        }
    }

    /// Unblocks any pending `pop_blocking` call and rejects further pushes.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.not_empty.notify_all();
        if let Some(mut writer) = self.writer.try_lock() {
            let _ = writer.file.flush();
        }
    }

    /// Approximate number of entries not yet popped; used for the
    /// `dque_queue_size` gauge.
    pub fn len(&self) -> u64 {
        *self.pending.lock()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flog_core::{LabelSet, Timestamp};
    use std::sync::Arc;

    fn entry(n: i64) -> QueueEntry {
        QueueEntry::new(
            LabelSet::from_pairs([("app", "demo")]),
            Timestamp::from_nanos(n),
            format!("line-{n}").into_bytes(),
        )
    }

    #[test]
    fn push_then_pop_round_trips_bytes_identical() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DurableQueue::open(dir.path(), 100, false).unwrap();
        let original = entry(1);
        queue.push(&original).unwrap();
        let popped = queue.pop_blocking().unwrap();
        assert_eq!(popped, original);
    }

    #[test]
    fn segment_file_is_unlinked_once_fully_drained() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DurableQueue::open(dir.path(), 2, false).unwrap();
        for i in 0..4 {
            queue.push(&entry(i)).unwrap();
        }
        for _ in 0..4 {
            queue.pop_blocking().unwrap();
        }
        assert!(!segment_path(dir.path(), 0).exists());
    }

    #[test]
    fn close_unblocks_pop_blocking_with_none() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path(), 10, false).unwrap());
        let q = queue.clone();
        let handle = std::thread::spawn(move || q.pop_blocking());
        std::thread::sleep(std::time::Duration::from_millis(50));
        queue.close();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn push_after_close_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DurableQueue::open(dir.path(), 10, false).unwrap();
        queue.close();
        assert!(matches!(queue.push(&entry(1)), Err(QueueError::Closed)));
    }

    #[test]
    fn pop_blocking_timeout_reports_timed_out_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DurableQueue::open(dir.path(), 10, false).unwrap();
        let outcome = queue.pop_blocking_timeout(std::time::Duration::from_millis(20));
        assert!(matches!(outcome, PopOutcome::TimedOut));
    }

    #[test]
    fn pop_blocking_timeout_returns_entry_when_available() {
        let dir = tempfile::tempdir().unwrap();
        let queue = DurableQueue::open(dir.path(), 10, false).unwrap();
        queue.push(&entry(1)).unwrap();
        let outcome = queue.pop_blocking_timeout(std::time::Duration::from_secs(1));
        assert!(matches!(outcome, PopOutcome::Entry(e) if e == entry(1)));
    }

    #[test]
    fn reopening_resumes_from_persisted_cursor() {
        let dir = tempfile::tempdir().unwrap();
        {
            let queue = DurableQueue::open(dir.path(), 10, true).unwrap();
            for i in 0..3 {
                queue.push(&entry(i)).unwrap();
            }
            assert_eq!(queue.pop_blocking().unwrap(), entry(0));
        }
        let reopened = DurableQueue::open(dir.path(), 10, true).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.pop_blocking().unwrap(), entry(1));
        assert_eq!(reopened.pop_blocking().unwrap(), entry(2));
    }
}
