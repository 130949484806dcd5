use std::io::Write;

use async_trait::async_trait;
use flog_core::Batch;
use serde::Serialize;

use crate::error::{ExportOutcome, SinkError};
use crate::sink::Sink;

#[derive(Serialize)]
struct WireStream<'a> {
    labels: std::collections::BTreeMap<&'a str, &'a str>,
    entries: Vec<WireEntry<'a>>,
}

#[derive(Serialize)]
struct WireEntry<'a> {
    timestamp_unix_nano: i64,
    #[serde(with = "serde_bytes_as_utf8_lossy")]
    line: &'a [u8],
}

mod serde_bytes_as_utf8_lossy {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(line: &&[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&String::from_utf8_lossy(line))
    }
}

/// Writes each flushed batch to stdout as one JSON object per line, for
/// local debugging (spec: "used for debugging").
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl Sink for StdoutSink {
    async fn export(&self, batch: &Batch) -> ExportOutcome {
        let streams: Vec<WireStream> = batch
            .streams()
            .map(|stream| WireStream {
                labels: stream.labels.iter().collect(),
                entries: stream
                    .entries
                    .iter()
                    .map(|(ts, line)| WireEntry {
                        timestamp_unix_nano: ts.as_nanos(),
                        line,
                    })
                    .collect(),
            })
            .collect();

        let line = match serde_json::to_string(&streams) {
            Ok(line) => line,
            Err(err) => return ExportOutcome::Permanent(SinkError::Encode(err.to_string())),
        };

        let mut stdout = std::io::stdout().lock();
        match writeln!(stdout, "{line}") {
            Ok(()) => ExportOutcome::Ok,
            Err(err) => ExportOutcome::Permanent(SinkError::Transport(err.to_string())),
        }
    }

    fn endpoint(&self) -> &str {
        "stdout"
    }
}
