use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::entry::{read_row, Row};
use crate::error::QueueError;

pub(crate) fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("segment-{index:06}.dat"))
}

pub(crate) fn cursor_path(dir: &Path) -> PathBuf {
    dir.join("cursor")
}

/// Segment indices present on disk, lowest first.
pub(crate) fn scan_segment_indices(dir: &Path) -> Result<Vec<u64>, QueueError> {
    let mut indices = Vec::new();
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(indices),
        Err(e) => return Err(QueueError::io(dir, e)),
    };
    for entry in read_dir {
        let entry = entry.map_err(|e| QueueError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(index) = name
            .strip_prefix("segment-")
            .and_then(|s| s.strip_suffix(".dat"))
            .and_then(|s| s.parse::<u64>().ok())
        {
            indices.push(index);
        }
    }
    indices.sort_unstable();
    Ok(indices)
}

pub(crate) fn create_segment_for_write(dir: &Path, index: u64) -> Result<File, QueueError> {
    let path = segment_path(dir, index);
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(true)
        .open(&path)
        .map_err(|e| QueueError::io(&path, e))
}

pub(crate) fn open_segment_for_read(dir: &Path, index: u64) -> Result<File, QueueError> {
    let path = segment_path(dir, index);
    File::open(&path).map_err(|e| QueueError::io(&path, e))
}

/// Scans a segment file from the start, counting well-formed rows and the
/// number of bytes they occupy. A torn trailing write (possible after a
/// crash in turbo mode, where pushes are not fsynced) stops the scan without
/// error; `valid_bytes` marks where the good data ends so the caller can
/// truncate the garbage tail before resuming writes.
pub(crate) fn scan_rows(path: &Path) -> Result<(u64, u64), QueueError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(QueueError::io(path, e)),
    };
    let mut reader = std::io::BufReader::new(file);
    let mut rows = 0u64;
    let mut valid_bytes = 0u64;
    loop {
        let before = valid_bytes;
        match read_row(&mut reader).map_err(|e| QueueError::io(path, e))? {
            None => break,
            Some(Row::Entry(entry)) => {
                let encoded_len = entry.encode()?.len() as u64;
                rows += 1;
                valid_bytes = before + encoded_len;
            }
            Some(Row::Corrupt { reason }) => {
                tracing::warn!(path = %path.display(), reason, "corrupt row found during recovery scan, truncating tail");
                break;
            }
        }
    }
    Ok((rows, valid_bytes))
}

/// Truncates `path` to `len` bytes if it is currently longer, discarding a
/// torn or corrupt trailing write left over from a crash.
pub(crate) fn truncate_to(path: &Path, len: u64) -> Result<(), QueueError> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| QueueError::io(path, e))?;
    let current_len = file
        .metadata()
        .map_err(|e| QueueError::io(path, e))?
        .len();
    if current_len > len {
        file.set_len(len).map_err(|e| QueueError::io(path, e))?;
    }
    Ok(())
}

pub(crate) fn unlink_segment(dir: &Path, index: u64) -> Result<(), QueueError> {
    let path = segment_path(dir, index);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(QueueError::io(&path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::QueueEntry;
    use flog_core::{LabelSet, Timestamp};
    use std::io::Write;

    #[test]
    fn scan_rows_counts_well_formed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), 0);
        let mut file = File::create(&path).unwrap();
        for i in 0..3 {
            let entry = QueueEntry::new(
                LabelSet::new(),
                Timestamp::from_nanos(i),
                format!("line-{i}").into_bytes(),
            );
            file.write_all(&entry.encode().unwrap()).unwrap();
        }
        drop(file);

        let (rows, valid_bytes) = scan_rows(&path).unwrap();
        assert_eq!(rows, 3);
        assert_eq!(valid_bytes, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn scan_rows_stops_at_torn_tail_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), 0);
        let entry = QueueEntry::new(LabelSet::new(), Timestamp::from_nanos(1), b"ok".to_vec());
        let mut bytes = entry.encode().unwrap();
        bytes.extend_from_slice(&999u32.to_le_bytes());
        bytes.extend_from_slice(b"short");
        fs::write(&path, &bytes).unwrap();

        let (rows, valid_bytes) = scan_rows(&path).unwrap();
        assert_eq!(rows, 1);
        assert_eq!(valid_bytes, entry.encode().unwrap().len() as u64);

        truncate_to(&path, valid_bytes).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), valid_bytes);
    }
}
