use std::path::PathBuf;

use clap::Parser;

/// Demo harness for the fleet log router: loads a config file, wires the
/// routing core exactly as the host collector's `init(ctx)` would, and
/// drives it from newline-delimited JSON records on stdin instead of the
/// host's `flush(ctx, record_blob, length)` call.
#[derive(Debug, Parser)]
#[command(name = "fleet-log-router-node", version, about)]
pub struct Cli {
    /// Path to the TOML config file (the typed equivalent of the host's
    /// key=value configuration surface, see spec §6).
    #[arg(long, env = "FLEET_LOG_ROUTER_CONFIG")]
    pub config: PathBuf,
}
