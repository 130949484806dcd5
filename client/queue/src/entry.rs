use std::io::{self, Read};

use flog_core::{LabelSet, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// The on-disk unit of the durable queue: one log line plus enough context to
/// rebuild the `Batch` it was meant for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub labels: LabelSet,
    pub timestamp: Timestamp,
    pub line: Vec<u8>,
}

impl QueueEntry {
    pub fn new(labels: LabelSet, timestamp: Timestamp, line: impl Into<Vec<u8>>) -> Self {
        Self {
            labels,
            timestamp,
            line: line.into(),
        }
    }

    /// Encodes as a length-prefixed row: `u32` little-endian byte length
    /// followed by the JSON body.
    pub fn encode(&self) -> Result<Vec<u8>, QueueError> {
        let body = serde_json::to_vec(self).map_err(QueueError::Encode)?;
        let mut row = Vec::with_capacity(4 + body.len());
        row.extend_from_slice(&(body.len() as u32).to_le_bytes());
        row.extend_from_slice(&body);
        Ok(row)
    }
}

/// Outcome of reading one row from a segment file.
pub(crate) enum Row {
    /// A row was read and decoded cleanly.
    Entry(QueueEntry),
    /// The length prefix was well-formed but the body failed to decode; the
    /// caller is responsible for skipping it and moving on.
    Corrupt { reason: String },
}

/// Reads exactly one row from `file`, if one is fully present.
///
/// Returns `Ok(None)` on a clean boundary: either the file is at EOF, or a
/// torn write (a length prefix with fewer body bytes than promised) has left
/// a truncated tail, e.g. from a crash mid-`push` in turbo mode. Either way
/// there is nothing more to read right now.
pub(crate) fn read_row<R: Read>(reader: &mut R) -> io::Result<Option<Row>> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_buf)? {
        false => return Ok(None),
        true => {}
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    if !read_exact_or_eof(reader, &mut body)? {
        return Ok(None);
    }
    match serde_json::from_slice::<QueueEntry>(&body) {
        Ok(entry) => Ok(Some(Row::Entry(entry))),
        Err(err) => Ok(Some(Row::Corrupt {
            reason: err.to_string(),
        })),
    }
}

/// Like `Read::read_exact`, but treats a zero-byte read at the very start as
/// "nothing here" (`Ok(false)`) instead of an `UnexpectedEof` error, and
/// treats any other short read the same way rather than erroring: a torn
/// trailing write is an expected shape for this format, not a bug.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn entry(line: &str) -> QueueEntry {
        QueueEntry::new(
            LabelSet::from_pairs([("app", "demo")]),
            Timestamp::from_nanos(42),
            line.as_bytes().to_vec(),
        )
    }

    #[test]
    fn round_trips_through_encode_and_read_row() {
        let original = entry("hello world");
        let encoded = original.encode().unwrap();
        let mut cursor = Cursor::new(encoded);
        match read_row(&mut cursor).unwrap() {
            Some(Row::Entry(decoded)) => assert_eq!(decoded, original),
            Some(Row::Corrupt { reason }) => panic!("expected a decoded entry, got corrupt: {reason}"),
            None => panic!("expected a decoded entry, got none"),
        }
    }

    #[test]
    fn clean_eof_at_row_boundary_reads_as_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_row(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn torn_length_prefix_reads_as_none_not_error() {
        let mut cursor = Cursor::new(vec![1, 2]);
        assert!(read_row(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn torn_body_reads_as_none_not_error() {
        let full = entry("payload").encode().unwrap();
        let torn = full[..full.len() - 3].to_vec();
        let mut cursor = Cursor::new(torn);
        assert!(read_row(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn garbage_body_with_valid_length_prefix_reads_as_corrupt() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(b"\xff\xff\xff\xff");
        let mut cursor = Cursor::new(bytes);
        match read_row(&mut cursor).unwrap() {
            Some(Row::Corrupt { .. }) => {}
            Some(Row::Entry(_)) => panic!("expected corrupt row, got a decoded entry"),
            None => panic!("expected corrupt row, got none"),
        }
    }
}
