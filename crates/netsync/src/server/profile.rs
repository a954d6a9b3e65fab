use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::zone::Zone;

/// Service level for one observer-count bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickProfile {
    /// Lowest connected-observer count this row applies to.
    pub min_observers: usize,
    pub tick_rate_hz: u32,
    pub mid_divisor: u32,
    pub far_divisor: u32,
    pub observers_per_tick: usize,
    /// Maximum records written into one observer's batch per tick.
    pub entity_budget: usize,
}

impl TickProfile {
    pub const fn new(
        min_observers: usize,
        tick_rate_hz: u32,
        mid_divisor: u32,
        far_divisor: u32,
        observers_per_tick: usize,
        entity_budget: usize,
    ) -> Self {
        Self {
            min_observers,
            tick_rate_hz,
            mid_divisor,
            far_divisor,
            observers_per_tick,
            entity_budget,
        }
    }

    pub fn tick_interval(&self) -> f32 {
        1.0 / self.tick_rate_hz as f32
    }

    pub fn cadence(&self, zone: Zone) -> u64 {
        match zone {
            Zone::Near => 1,
            Zone::Mid => self.mid_divisor as u64,
            Zone::Far => self.far_divisor as u64,
        }
    }

    /// True if the zone is due on this tick.
    pub fn is_due(&self, zone: Zone, tick: u64) -> bool {
        tick % self.cadence(zone).max(1) == 0
    }
}

/// Rows sorted by `min_observers`; quality never increases down the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileTable(Vec<TickProfile>);

impl Default for ProfileTable {
    fn default() -> Self {
        Self(vec![
            TickProfile::new(0, 30, 2, 4, 8, 512),
            TickProfile::new(10, 20, 2, 5, 6, 384),
            TickProfile::new(20, 20, 3, 6, 4, 256),
            TickProfile::new(25, 15, 3, 6, 4, 256),
            TickProfile::new(30, 15, 3, 8, 3, 192),
            TickProfile::new(40, 10, 4, 8, 2, 128),
        ])
    }
}

impl ProfileTable {
    pub fn new(rows: Vec<TickProfile>) -> Result<Self, ConfigError> {
        let table = Self(rows);
        table.validate()?;
        Ok(table)
    }

    pub fn rows(&self) -> &[TickProfile] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let first = self.0.first().ok_or(ConfigError::EmptyProfileTable)?;
        if first.min_observers != 0 {
            return Err(ConfigError::InvalidProfile {
                row: 0,
                reason: "first row must start at zero observers",
            });
        }

        for (row, p) in self.0.iter().enumerate() {
            if p.tick_rate_hz == 0 {
                return Err(ConfigError::InvalidProfile {
                    row,
                    reason: "tick rate must be positive",
                });
            }
            if p.mid_divisor == 0 || p.mid_divisor >= p.far_divisor {
                return Err(ConfigError::InvalidProfile {
                    row,
                    reason: "divisors must satisfy 1 <= mid < far",
                });
            }
            if p.observers_per_tick == 0 || p.entity_budget == 0 {
                return Err(ConfigError::InvalidProfile {
                    row,
                    reason: "per-tick budgets must be positive",
                });
            }
        }

        for (i, pair) in self.0.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let row = i + 1;
            if next.min_observers <= prev.min_observers {
                return Err(ConfigError::InvalidProfile {
                    row,
                    reason: "observer thresholds must be strictly increasing",
                });
            }
            if next.tick_rate_hz > prev.tick_rate_hz
                || next.mid_divisor < prev.mid_divisor
                || next.far_divisor < prev.far_divisor
                || next.observers_per_tick > prev.observers_per_tick
                || next.entity_budget > prev.entity_budget
            {
                return Err(ConfigError::InvalidProfile {
                    row,
                    reason: "service quality must not increase with observer count",
                });
            }
        }
        Ok(())
    }

    /// Index of the row for `observers` connected peers.
    pub fn select_index(&self, observers: usize) -> usize {
        self.0
            .iter()
            .rposition(|p| p.min_observers <= observers)
            .unwrap_or(0)
    }

    /// Like [`select_index`](Self::select_index) but one row lower in quality
    /// when `degraded` is set, saturating at the last row.
    pub fn select_index_with(&self, observers: usize, degraded: bool) -> usize {
        let idx = self.select_index(observers);
        if degraded {
            (idx + 1).min(self.0.len().saturating_sub(1))
        } else {
            idx
        }
    }

    pub fn get(&self, index: usize) -> Option<&TickProfile> {
        self.0.get(index)
    }
}
