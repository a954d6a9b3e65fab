use serde::{Deserialize, Serialize};

use crate::broadcast::BroadcastConfig;
use crate::client::ClientConfig;
use crate::delta::DeltaThresholds;
use crate::monitor::MonitorConfig;
use crate::quant::QuantizationConfig;
use crate::server::{BaselineConfig, ProfileTable};
use crate::zone::{Zone, ZoneConfig};

pub const DEFAULT_MAX_CATCH_UP_TICKS: u32 = 5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("zone radii must satisfy 0 < near <= mid <= far")]
    UnorderedRadii,
    #[error("profile table is empty")]
    EmptyProfileTable,
    #[error("profile row {row}: {reason}")]
    InvalidProfile { row: usize, reason: &'static str },
    #[error("{0} history depth must be at least 1")]
    ZeroBufferDepth(&'static str),
    #[error("{0} must be a positive finite number")]
    NonPositive(&'static str),
    #[error("{0} must not be negative")]
    Negative(&'static str),
    #[error("max catch-up ticks must be at least 1")]
    InvalidCatchUp,
}

/// Everything a replication session can be tuned with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub zones: ZoneConfig,
    pub thresholds: DeltaThresholds,
    pub quantization: QuantizationConfig,
    pub profiles: ProfileTable,
    pub baseline: BaselineConfig,
    pub monitor: MonitorConfig,
    pub client: ClientConfig,
    pub broadcast: BroadcastConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub max_catch_up_ticks: u32,
    /// Use the performance monitor to step down one profile row when slow.
    pub adaptive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_catch_up_ticks: DEFAULT_MAX_CATCH_UP_TICKS,
            adaptive: true,
        }
    }
}

fn positive(value: f32, name: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive(name))
    }
}

fn non_negative(value: f32, name: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative(name))
    }
}

impl ReplicationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.zones.is_ordered() {
            return Err(ConfigError::UnorderedRadii);
        }

        positive(self.quantization.position_step, "position step")?;
        positive(self.quantization.velocity_step, "velocity step")?;

        non_negative(self.thresholds.position_sq, "position threshold")?;
        non_negative(self.thresholds.rotation_deg, "rotation threshold")?;
        non_negative(self.thresholds.velocity_sq, "velocity threshold")?;

        self.profiles.validate()?;

        if self.server.max_catch_up_ticks == 0 {
            return Err(ConfigError::InvalidCatchUp);
        }
        if self.baseline.max_entries == 0 {
            return Err(ConfigError::NonPositive("baseline max entries"));
        }
        if self.baseline.sweep_interval == 0 {
            return Err(ConfigError::NonPositive("baseline sweep interval"));
        }

        self.validate_client()?;
        positive(self.broadcast.max_payload as f32, "broadcast max payload")?;
        positive(self.monitor.degraded_frame_time, "degraded frame time")?;
        Ok(())
    }

    fn validate_client(&self) -> Result<(), ConfigError> {
        let client = &self.client;
        for zone in Zone::ALL {
            if client.history_depth.get(zone) == 0 {
                return Err(ConfigError::ZeroBufferDepth(zone.as_str()));
            }
            non_negative(client.smoothing.get(zone), "smoothing factor")?;
        }
        non_negative(client.interpolation_delay as f32, "interpolation delay")?;
        non_negative(client.extrapolation_confidence, "extrapolation confidence")?;
        non_negative(client.rotation_damping, "rotation damping")?;
        non_negative(client.smoothing_rate, "smoothing rate")?;
        non_negative(client.max_extrapolation as f32, "max extrapolation")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneTable;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ReplicationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_unordered_radii() {
        let mut config = ReplicationConfig::default();
        config.zones.mid_radius = 300.0;
        assert_eq!(config.validate(), Err(ConfigError::UnorderedRadii));
    }

    #[test]
    fn rejects_zero_depth() {
        let mut config = ReplicationConfig::default();
        config.client.history_depth = ZoneTable::new(16, 0, 4);
        assert_eq!(config.validate(), Err(ConfigError::ZeroBufferDepth("mid")));
    }

    #[test]
    fn rejects_zero_step_and_catch_up() {
        let mut config = ReplicationConfig::default();
        config.quantization.position_step = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositive("position step"))
        );

        let mut config = ReplicationConfig::default();
        config.server.max_catch_up_ticks = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidCatchUp));
    }
}
