use std::collections::BTreeMap;
use std::io::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use flog_core::config::Compression;
use flog_core::Batch;
use reqwest::Client;
use serde::Serialize;

use crate::error::{ExportOutcome, SinkError};
use crate::sink::Sink;

#[derive(Serialize)]
struct WireRecord {
    timestamp_unix_nano: i64,
    attributes: BTreeMap<String, String>,
    body: String,
}

#[derive(Serialize)]
struct WireRequest {
    batch_id: u64,
    records: Vec<WireRecord>,
}

/// Exports batches as JSON over HTTP/1.1 or HTTP/2 (negotiated by the
/// underlying client), one POST per flushed batch.
pub struct OtlpHttpSink {
    client: Client,
    endpoint: String,
    compression: Compression,
}

impl OtlpHttpSink {
    pub fn new(
        endpoint: impl Into<String>,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
        compression: Compression,
        insecure: bool,
    ) -> Result<Self, SinkError> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SinkError::Transport(format!("invalid header name {key}: {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| SinkError::Transport(format!("invalid header value for {key}: {e}")))?;
            header_map.insert(name, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(header_map)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            compression,
        })
    }

    fn encode(&self, batch: &Batch) -> Result<Vec<u8>, SinkError> {
        let records: Vec<WireRecord> = batch
            .streams()
            .flat_map(|stream| {
                stream.entries.iter().map(move |(ts, line)| WireRecord {
                    timestamp_unix_nano: ts.as_nanos(),
                    attributes: stream
                        .labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    body: String::from_utf8_lossy(line).into_owned(),
                })
            })
            .collect();

        let body = serde_json::to_vec(&WireRequest {
            batch_id: batch.id(),
            records,
        })
        .map_err(|e| SinkError::Encode(e.to_string()))?;

        match self.compression {
            Compression::None => Ok(body),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
                encoder
                    .write_all(&body)
                    .map_err(|e| SinkError::Encode(e.to_string()))?;
                encoder.finish().map_err(|e| SinkError::Encode(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Sink for OtlpHttpSink {
    async fn export(&self, batch: &Batch) -> ExportOutcome {
        let body = match self.encode(batch) {
            Ok(body) => body,
            Err(err) => return ExportOutcome::Permanent(err),
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json");
        if matches!(self.compression, Compression::Gzip) {
            request = request.header("content-encoding", "gzip");
        }

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() || err.is_connect() => {
                return ExportOutcome::Retryable(SinkError::Transport(err.to_string()))
            }
            Err(err) => return ExportOutcome::Retryable(SinkError::Transport(err.to_string())),
        };

        let status = response.status();
        if status.is_success() {
            return ExportOutcome::Ok;
        }

        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable response body>".to_string());

        // Rate-limit (429) and all 5xx are retryable; other 4xx are schema
        // rejections and are permanent.
        if status.as_u16() == 429 || status.is_server_error() {
            ExportOutcome::Retryable(SinkError::Rejected(format!("{status}: {body_text}")))
        } else {
            ExportOutcome::Permanent(SinkError::Rejected(format!("{status}: {body_text}")))
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
