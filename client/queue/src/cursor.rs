use std::fs;
use std::path::Path;

use crate::error::QueueError;

/// The reader's position: which segment it is reading, and how many rows of
/// that segment have already been consumed.
///
/// Persisted as `"<segment> <row_offset>"` in a sibling file next to the
/// segment directory, rewritten via a temp-file-plus-rename so a crash mid
/// write never leaves a half-written cursor behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub segment: u64,
    pub row_offset: u64,
}

impl Cursor {
    pub fn read_or_default(path: &Path) -> Result<Self, QueueError> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Self::parse(&raw).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(QueueError::io(path, e)),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split_whitespace();
        let segment = parts.next()?.parse().ok()?;
        let row_offset = parts.next()?.parse().ok()?;
        Some(Self {
            segment,
            row_offset,
        })
    }

    pub fn persist(self, path: &Path, sync: bool) -> Result<(), QueueError> {
        let tmp = path.with_extension("tmp");
        let body = format!("{} {}", self.segment, self.row_offset);
        fs::write(&tmp, body).map_err(|e| QueueError::io(&tmp, e))?;
        if sync {
            if let Ok(file) = fs::File::open(&tmp) {
                let _ = file.sync_all();
            }
        }
        fs::rename(&tmp, path).map_err(|e| QueueError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cursor_file_defaults_to_segment_zero() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = Cursor::read_or_default(&dir.path().join("cursor")).unwrap();
        assert_eq!(cursor, Cursor::default());
    }

    #[test]
    fn persisted_cursor_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor");
        let original = Cursor {
            segment: 7,
            row_offset: 1234,
        };
        original.persist(&path, false).unwrap();
        let read_back = Cursor::read_or_default(&path).unwrap();
        assert_eq!(read_back, original);
    }
}
