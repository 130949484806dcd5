use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct DurableQueueConfig {
    pub dir: String,
    pub name: String,
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,
    /// `normal` -> false (turbo, buffered), `full` -> true (sync, fsync per push).
    #[serde(default)]
    pub sync: bool,
}

fn default_segment_size() -> usize {
    10_000
}
