//! Drives a [`flog_routing::RoutingPlugin`] from newline-delimited JSON on
//! stdin, standing in for the host collector's `flush(ctx, record_blob,
//! length)` call (spec §6; the host ABI shim itself is out of scope).

use std::collections::BTreeMap;
use std::sync::Arc;

use flog_core::Timestamp;
use flog_routing::{RawValue, RoutingPlugin};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// Reads one JSON object per line from stdin until EOF, converting each into
/// the raw record shape `RoutingPlugin::handle` expects and handing it off.
/// A line that isn't a JSON object is logged and skipped, matching the
/// plugin's own "log and drop, never fail fatally" error policy.
pub async fn run(plugin: Arc<RoutingPlugin>) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "skipping line that is not valid JSON");
                continue;
            }
        };
        let serde_json::Value::Object(object) = value else {
            warn!("skipping line that is not a JSON object");
            continue;
        };

        let raw = json_object_to_raw(object);
        plugin.handle(Timestamp::now(), raw).await;
    }
}

fn json_object_to_raw(object: serde_json::Map<String, serde_json::Value>) -> BTreeMap<Vec<u8>, RawValue> {
    object
        .into_iter()
        .map(|(key, value)| (key.into_bytes(), json_to_raw(value)))
        .collect()
}

fn json_to_raw(value: serde_json::Value) -> RawValue {
    match value {
        serde_json::Value::Null => RawValue::Null,
        serde_json::Value::Bool(b) => RawValue::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                RawValue::Int(i)
            } else {
                RawValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => RawValue::Bytes(s.into_bytes()),
        serde_json::Value::Array(items) => RawValue::Array(items.into_iter().map(json_to_raw).collect()),
        serde_json::Value::Object(object) => RawValue::Map(
            object
                .into_iter()
                .map(|(key, value)| (key.into_bytes(), json_to_raw(value)))
                .collect(),
        ),
    }
}
