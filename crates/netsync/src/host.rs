//! Capabilities the embedding process provides to the replication core.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bytes::Bytes;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::snapshot::{EntityId, Snapshot};

/// Handle for a remote participant, assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer is disconnected")]
    Disconnected,
    #[error("transport rejected batch: {0}")]
    Rejected(String),
}

/// One outbound connection. Delivery is assumed in-order per peer.
pub trait PeerConnection {
    fn observer_id(&self) -> ObserverId;

    fn is_connected(&self) -> bool;

    /// Point the observer's interest zones are measured from.
    fn reference_position(&self) -> Vec3;

    fn send(&mut self, batch: Bytes) -> Result<(), TransportError>;
}

/// Read-only access to the host's canonical entity state.
pub trait EntitySource {
    /// Appends the current snapshot of every replicated entity to `out`.
    fn capture(&self, out: &mut Vec<(EntityId, Snapshot)>);
}

impl EntitySource for HashMap<EntityId, Snapshot> {
    fn capture(&self, out: &mut Vec<(EntityId, Snapshot)>) {
        out.extend(self.iter().map(|(id, s)| (*id, *s)));
    }
}

impl EntitySource for BTreeMap<EntityId, Snapshot> {
    fn capture(&self, out: &mut Vec<(EntityId, Snapshot)>) {
        out.extend(self.iter().map(|(id, s)| (*id, *s)));
    }
}

impl EntitySource for [(EntityId, Snapshot)] {
    fn capture(&self, out: &mut Vec<(EntityId, Snapshot)>) {
        out.extend_from_slice(self);
    }
}

impl EntitySource for Vec<(EntityId, Snapshot)> {
    fn capture(&self, out: &mut Vec<(EntityId, Snapshot)>) {
        out.extend_from_slice(self);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Transform {
    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY)
    }
}

/// Client-side proxies the host renders for remote entities.
pub trait RenderScene {
    /// Appends the ids of every proxy rendered this frame.
    fn rendered(&self, out: &mut Vec<EntityId>);

    fn transform(&self, id: EntityId) -> Option<Transform>;

    fn write_transform(&mut self, id: EntityId, transform: Transform);
}

impl RenderScene for HashMap<EntityId, Transform> {
    fn rendered(&self, out: &mut Vec<EntityId>) {
        out.extend(self.keys().copied());
    }

    fn transform(&self, id: EntityId) -> Option<Transform> {
        self.get(&id).copied()
    }

    fn write_transform(&mut self, id: EntityId, transform: Transform) {
        if let Some(slot) = self.get_mut(&id) {
            *slot = transform;
        }
    }
}
