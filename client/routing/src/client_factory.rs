//! Builds one [`OutputClient`] (queue + sink + batch processor) from a
//! [`ClientConfig`], the one piece of wiring spec §6's config surface exists
//! to drive.

use std::sync::Arc;

use flog_core::config::{ClientConfig, SinkConfig, SinkKind, TlsConfig};
use flog_pipeline::{BatchProcessor, OutputClient, DEFAULT_ID_LABEL_NAME};
use flog_queue::DurableQueue;
use flog_sink::{NoopSink, OtlpGrpcSink, OtlpHttpSink, Sink, StdoutSink};
use flog_metrics::RouterMetrics;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::error::RoutingError;

/// Builds the shoot or seed side of a tenant's [`crate::dual_target::TenantClient`].
///
/// `endpoint_override` lets the caller substitute a per-tenant dynamic
/// endpoint (computed from `dynamic_host_prefix`/`tenant_name`/
/// `dynamic_host_suffix`) for `config.sink.endpoint`, without having to
/// clone and mutate the whole `SinkConfig` at each call site.
pub async fn build_output_client(
    config: &ClientConfig,
    name: &str,
    endpoint_override: Option<&str>,
    metrics: Option<Arc<RouterMetrics>>,
) -> Result<OutputClient, RoutingError> {
    let queue = DurableQueue::open(
        std::path::Path::new(&config.queue.dir).join(&config.queue.name),
        config.queue.segment_size as u64,
        config.queue.sync,
    )
    .map_err(|e| RoutingError::Build(format!("opening durable queue for {name}: {e}")))?;

    let sink = build_sink(&config.sink, endpoint_override).await?;
    let endpoint = sink.endpoint().to_string();

    let processor = BatchProcessor::spawn(
        config.batch_processor.clone(),
        DEFAULT_ID_LABEL_NAME,
        Arc::new(queue),
        sink,
        metrics,
    );

    Ok(OutputClient::new(processor, endpoint))
}

async fn build_sink(config: &SinkConfig, endpoint_override: Option<&str>) -> Result<Arc<dyn Sink>, RoutingError> {
    let endpoint = endpoint_override.unwrap_or(&config.endpoint);

    let sink: Arc<dyn Sink> = match config.kind {
        SinkKind::Noop => Arc::new(NoopSink),
        SinkKind::Stdout => Arc::new(StdoutSink),
        SinkKind::OtlpHttp => Arc::new(
            OtlpHttpSink::new(
                endpoint,
                &config.headers,
                config.timeout,
                config.compression,
                config.insecure,
            )
            .map_err(|e| RoutingError::Build(format!("building OTLP/HTTP sink: {e}")))?,
        ),
        SinkKind::OtlpGrpc => {
            let tls = build_tls(&config.tls, config.insecure)?;
            Arc::new(
                OtlpGrpcSink::connect(
                    endpoint,
                    config.timeout,
                    config.compression == flog_core::config::Compression::Gzip,
                    tls,
                )
                .await
                .map_err(|e| RoutingError::Build(format!("connecting OTLP/gRPC sink: {e}")))?,
            )
        }
    };

    Ok(sink)
}

/// Builds a `tonic` TLS config from the typed knobs, or `None` when the sink
/// has no TLS material configured at all (a plaintext `grpc://` endpoint).
///
/// `insecure_skip_verify`/`min_version`/`max_version` are validated by
/// `TlsConfig::validate` but have no equivalent on `tonic::transport::
/// ClientTlsConfig`, which always verifies the peer and negotiates its own
/// supported version range; they are accepted here for config-surface parity
/// with the spec and silently have no effect on the gRPC sink specifically
/// (`insecure` on the outer `SinkConfig` does the same job for the HTTP
/// sink via `reqwest::ClientBuilder::danger_accept_invalid_certs`).
fn build_tls(config: &TlsConfig, insecure: bool) -> Result<Option<ClientTlsConfig>, RoutingError> {
    if !insecure && config.ca_file.is_none() && config.cert_file.is_none() {
        return Ok(None);
    }

    let mut tls = ClientTlsConfig::new();

    if let Some(ca_file) = &config.ca_file {
        let pem = std::fs::read(ca_file)
            .map_err(|e| RoutingError::Build(format!("reading TLSCAFile {ca_file}: {e}")))?;
        tls = tls.ca_certificate(Certificate::from_pem(pem));
    }

    if let (Some(cert_file), Some(key_file)) = (&config.cert_file, &config.key_file) {
        let cert = std::fs::read(cert_file)
            .map_err(|e| RoutingError::Build(format!("reading TLSCertFile {cert_file}: {e}")))?;
        let key = std::fs::read(key_file)
            .map_err(|e| RoutingError::Build(format!("reading TLSKeyFile {key_file}: {e}")))?;
        tls = tls.identity(Identity::from_pem(cert, key));
    }

    if let Some(server_name) = &config.server_name {
        tls = tls.domain_name(server_name.clone());
    }

    Ok(Some(tls))
}
