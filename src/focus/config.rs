use serde::{Deserialize, Serialize};

/// Tuning for the focus monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FocusConfig {
    /// Length of one sampling bucket.
    pub interval_ms: u64,

    /// Share of viewport width and height covered by the centered attention
    /// region.
    pub region_fraction: f64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            region_fraction: 0.5,
        }
    }
}
