use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Distance tier of an entity relative to an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Zone {
    Near = 0,
    Mid = 1,
    Far = 2,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Near, Zone::Mid, Zone::Far];

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Near),
            1 => Some(Self::Mid),
            2 => Some(Self::Far),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Near => "near",
            Zone::Mid => "mid",
            Zone::Far => "far",
        }
    }
}

/// One value per zone, used for ring depths and smoothing factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneTable<T> {
    pub near: T,
    pub mid: T,
    pub far: T,
}

impl<T: Copy> ZoneTable<T> {
    pub const fn new(near: T, mid: T, far: T) -> Self {
        Self { near, mid, far }
    }

    pub fn get(&self, zone: Zone) -> T {
        match zone {
            Zone::Near => self.near,
            Zone::Mid => self.mid,
            Zone::Far => self.far,
        }
    }
}

/// Interest radii in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub near_radius: f32,
    pub mid_radius: f32,
    pub far_radius: f32,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            near_radius: 40.0,
            mid_radius: 120.0,
            far_radius: 250.0,
        }
    }
}

impl ZoneConfig {
    pub fn is_ordered(&self) -> bool {
        0.0 < self.near_radius && self.near_radius <= self.mid_radius && self.mid_radius <= self.far_radius
    }

    pub fn interest(&self) -> InterestZones {
        InterestZones {
            near_sq: self.near_radius * self.near_radius,
            mid_sq: self.mid_radius * self.mid_radius,
            far_sq: self.far_radius * self.far_radius,
        }
    }
}

/// Precomputed squared radii so the hot path never takes a square root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterestZones {
    pub near_sq: f32,
    pub mid_sq: f32,
    pub far_sq: f32,
}

impl InterestZones {
    /// Bounds are inclusive. `None` means beyond the far radius, i.e. out
    /// of interest.
    #[inline]
    pub fn classify(&self, distance_sq: f32) -> Option<Zone> {
        if distance_sq <= self.near_sq {
            Some(Zone::Near)
        } else if distance_sq <= self.mid_sq {
            Some(Zone::Mid)
        } else if distance_sq <= self.far_sq {
            Some(Zone::Far)
        } else {
            None
        }
    }

    #[inline]
    pub fn classify_between(&self, observer: Vec3, entity: Vec3) -> Option<Zone> {
        self.classify(observer.distance_squared(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_inclusive() {
        let zones = ZoneConfig {
            near_radius: 10.0,
            mid_radius: 20.0,
            far_radius: 30.0,
        }
        .interest();

        assert_eq!(zones.classify(0.0), Some(Zone::Near));
        assert_eq!(zones.classify(100.0), Some(Zone::Near));
        assert_eq!(zones.classify(100.5), Some(Zone::Mid));
        assert_eq!(zones.classify(400.0), Some(Zone::Mid));
        assert_eq!(zones.classify(900.0), Some(Zone::Far));
        assert_eq!(zones.classify(900.1), None);
    }

    #[test]
    fn classify_between_positions() {
        let zones = ZoneConfig::default().interest();
        let observer = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(zones.classify_between(observer, Vec3::new(50.0, 0.0, 0.0)), Some(Zone::Near));
        assert_eq!(zones.classify_between(observer, Vec3::new(100.0, 0.0, 0.0)), Some(Zone::Mid));
        assert_eq!(zones.classify_between(observer, Vec3::new(300.0, 0.0, 0.0)), None);
    }

    #[test]
    fn wire_values() {
        for zone in Zone::ALL {
            assert_eq!(Zone::from_wire(zone as u8), Some(zone));
        }
        assert_eq!(Zone::from_wire(3), None);
    }

    #[test]
    fn zone_table_lookup() {
        let depths = ZoneTable::new(16usize, 8, 4);
        assert_eq!(depths.get(Zone::Near), 16);
        assert_eq!(depths.get(Zone::Far), 4);
    }
}
