use bitflags::bitflags;
use glam::Quat;
use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

bitflags! {
    /// Which fields a delta carries. Bit values are the wire values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeltaMask: u8 {
        const POSITION = 1 << 0;
        const ROTATION = 1 << 1;
        const VELOCITY = 1 << 2;
        const HEALTH = 1 << 3;
        const FLAGS = 1 << 4;
    }
}

/// Significance thresholds. A field is marked changed only when its change
/// is strictly greater than the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaThresholds {
    /// Squared distance, world units².
    pub position_sq: f32,
    /// Angle in degrees.
    pub rotation_deg: f32,
    /// Squared speed difference, (units/s)².
    pub velocity_sq: f32,
    /// Absolute health difference. Zero means any change.
    pub health: u32,
    /// Flag bits that participate in change detection.
    pub flags_mask: u32,
}

impl Default for DeltaThresholds {
    fn default() -> Self {
        Self {
            position_sq: 1e-4,
            rotation_deg: 0.5,
            velocity_sq: 1e-4,
            health: 0,
            flags_mask: u32::MAX,
        }
    }
}

/// Changed-field delta. Masked fields of `state` hold the new absolute
/// values; unmasked fields are meaningless and are never transmitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delta {
    pub mask: DeltaMask,
    pub state: Snapshot,
}

impl Delta {
    pub fn has_any(&self) -> bool {
        !self.mask.is_empty()
    }

    pub fn full(state: Snapshot) -> Self {
        Self {
            mask: DeltaMask::all(),
            state,
        }
    }

    /// Merges the carried fields onto `base`.
    pub fn apply_to(&self, base: &Snapshot) -> Snapshot {
        let mut out = *base;
        if self.mask.contains(DeltaMask::POSITION) {
            out.position = self.state.position;
        }
        if self.mask.contains(DeltaMask::ROTATION) {
            out.rotation = self.state.rotation;
        }
        if self.mask.contains(DeltaMask::VELOCITY) {
            out.velocity = self.state.velocity;
        }
        if self.mask.contains(DeltaMask::HEALTH) {
            out.health = self.state.health;
        }
        if self.mask.contains(DeltaMask::FLAGS) {
            out.flags = self.state.flags;
        }
        out
    }
}

/// Angle between two rotations in degrees. A zero-length input counts as
/// maximally different.
pub fn angle_between_deg(a: Quat, b: Quat) -> f32 {
    let norm = a.length() * b.length();
    if norm < 1e-6 {
        return 180.0;
    }
    let dot = (a.dot(b).abs() / norm).min(1.0);
    if dot > 1.0 - 1e-6 {
        0.0
    } else {
        (2.0 * dot.acos()).to_degrees()
    }
}

pub fn make_delta(previous: &Snapshot, current: &Snapshot, thresholds: &DeltaThresholds) -> Delta {
    let mut mask = DeltaMask::empty();

    if (current.position - previous.position).length_squared() > thresholds.position_sq {
        mask |= DeltaMask::POSITION;
    }
    if angle_between_deg(current.rotation, previous.rotation) > thresholds.rotation_deg {
        mask |= DeltaMask::ROTATION;
    }
    if (current.velocity - previous.velocity).length_squared() > thresholds.velocity_sq {
        mask |= DeltaMask::VELOCITY;
    }
    if current.health.abs_diff(previous.health) > thresholds.health {
        mask |= DeltaMask::HEALTH;
    }
    if (current.flags ^ previous.flags) & thresholds.flags_mask != 0 {
        mask |= DeltaMask::FLAGS;
    }

    Delta {
        mask,
        state: *current,
    }
}

/// Delta for an entity the receiver has no baseline for. Carries every
/// field, so zeroed values overwrite whatever the receiver still holds.
pub fn first_contact(current: &Snapshot) -> Delta {
    Delta::full(*current)
}
