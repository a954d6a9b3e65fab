use std::fmt;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Session-unique entity identifier: owning session plus per-owner sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub owner: i64,
    pub sequence: u32,
}

impl EntityId {
    pub const fn new(owner: i64, sequence: u32) -> Self {
        Self { owner, sequence }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.sequence)
    }
}

/// Replicated fields of one entity at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub health: i32,
    pub flags: u32,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            health: 0,
            flags: 0,
        }
    }
}

impl Snapshot {
    /// Diff baseline for an entity that has never been sent. The zero
    /// quaternion is deliberately not a valid rotation.
    pub const EMPTY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
        velocity: Vec3::ZERO,
        health: 0,
        flags: 0,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Self::default()
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_health(mut self, health: i32) -> Self {
        self.health = health;
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}
