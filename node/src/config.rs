use std::path::Path;

use flog_core::config::Config;

/// Reads and validates the config file at `path`. `toml::from_str` gets the
/// file into a plausible `Config`; `Config::validate` catches the
/// cross-field invariants `serde` alone cannot express.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
    Ok(config)
}
