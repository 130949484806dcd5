use std::time::Duration;

use async_trait::async_trait;
use flog_core::Batch;
use tokio::sync::Mutex;
use tonic::codec::CompressionEncoding;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::error::{ExportOutcome, SinkError};
use crate::sink::Sink;

pub mod wire {
    tonic::include_proto!("flog.otlp");
}

use wire::log_export_client::LogExportClient;
use wire::{ExportLogsRequest, ExportLogsResponse, LogRecord as WireLogRecord};

/// Exports batches over a long-lived bidirectional gRPC stream: one request
/// message per batch, read back one response per batch. The stream is
/// opened lazily on first export and kept open across calls; a dropped
/// stream is reopened on the next export.
pub struct OtlpGrpcSink {
    endpoint: String,
    channel: Channel,
    compressed: bool,
    stream: Mutex<Option<BoundStream>>,
}

struct BoundStream {
    sender: tokio::sync::mpsc::Sender<ExportLogsRequest>,
    responses: tonic::Streaming<ExportLogsResponse>,
}

impl OtlpGrpcSink {
    pub async fn connect(
        endpoint: impl Into<String>,
        timeout: Duration,
        gzip: bool,
        tls: Option<ClientTlsConfig>,
    ) -> Result<Self, SinkError> {
        let endpoint = endpoint.into();
        let mut builder = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| SinkError::Transport(e.to_string()))?
            .timeout(timeout);
        if let Some(tls) = tls {
            builder = builder
                .tls_config(tls)
                .map_err(|e| SinkError::Transport(e.to_string()))?;
        }
        let channel = builder
            .connect()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint,
            channel,
            compressed: gzip,
            stream: Mutex::new(None),
        })
    }

    fn client(&self) -> LogExportClient<Channel> {
        let mut client = LogExportClient::new(self.channel.clone());
        if self.compressed {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        client
    }

    async fn ensure_stream(&self, guard: &mut Option<BoundStream>) -> Result<(), SinkError> {
        if guard.is_some() {
            return Ok(());
        }
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let outbound = tokio_stream::wrappers::ReceiverStream::new(rx);
        let mut client = self.client();
        let response = client
            .export(outbound)
            .await
            .map_err(|status| SinkError::Transport(status.to_string()))?;
        *guard = Some(BoundStream {
            sender: tx,
            responses: response.into_inner(),
        });
        Ok(())
    }
}

fn to_wire(batch: &Batch) -> ExportLogsRequest {
    let records = batch
        .streams()
        .flat_map(|stream| {
            stream.entries.iter().map(move |(ts, line)| WireLogRecord {
                timestamp_unix_nano: ts.as_nanos(),
                attributes: stream
                    .labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: line.clone(),
            })
        })
        .collect();

    ExportLogsRequest {
        batch_id: batch.id(),
        records,
    }
}

fn classify_status(status: &tonic::Status) -> SinkError {
    SinkError::Rejected(format!("{}: {}", status.code(), status.message()))
}

fn is_retryable(status: &tonic::Status) -> bool {
    use tonic::Code::*;
    matches!(
        status.code(),
        Unavailable | ResourceExhausted | DeadlineExceeded | Aborted | Internal
    )
}

#[async_trait]
impl Sink for OtlpGrpcSink {
    async fn export(&self, batch: &Batch) -> ExportOutcome {
        let request = to_wire(batch);
        let mut guard = self.stream.lock().await;

        if let Err(err) = self.ensure_stream(&mut guard).await {
            return ExportOutcome::Retryable(err);
        }
        let bound = guard.as_mut().expect("stream established above");

        if bound.sender.send(request).await.is_err() {
            *guard = None;
            return ExportOutcome::Retryable(SinkError::Transport(
                "export stream closed unexpectedly".to_string(),
            ));
        }

        match bound.responses.message().await {
            Ok(Some(response)) if response.accepted => ExportOutcome::Ok,
            Ok(Some(response)) => {
                ExportOutcome::Permanent(SinkError::Rejected(response.error))
            }
            Ok(None) => {
                *guard = None;
                ExportOutcome::Retryable(SinkError::Transport(
                    "export stream closed by peer".to_string(),
                ))
            }
            Err(status) => {
                let retryable = is_retryable(&status);
                let err = classify_status(&status);
                *guard = None;
                if retryable {
                    ExportOutcome::Retryable(err)
                } else {
                    ExportOutcome::Permanent(err)
                }
            }
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
