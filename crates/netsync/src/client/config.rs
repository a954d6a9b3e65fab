use serde::{Deserialize, Serialize};

use crate::zone::ZoneTable;

pub const DEFAULT_INTERPOLATION_DELAY: f64 = 0.12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seconds the render time trails the newest received state.
    pub interpolation_delay: f64,
    pub history_depth: ZoneTable<usize>,
    /// Blend aggressiveness per zone, scaled by frame time.
    pub smoothing: ZoneTable<f32>,
    pub smoothing_rate: f32,
    /// Multiplier on the zone smoothing factor while extrapolating.
    pub extrapolation_confidence: f32,
    /// Further multiplier applied to rotation while extrapolating.
    pub rotation_damping: f32,
    /// Extrapolation never projects further than this many seconds.
    pub max_extrapolation: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            interpolation_delay: DEFAULT_INTERPOLATION_DELAY,
            history_depth: ZoneTable::new(16, 8, 4),
            smoothing: ZoneTable::new(0.8, 0.5, 0.3),
            smoothing_rate: 10.0,
            extrapolation_confidence: 0.5,
            rotation_damping: 0.8,
            max_extrapolation: 0.5,
        }
    }
}
