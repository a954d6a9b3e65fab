use std::collections::VecDeque;

use bytes::Bytes;
use glam::Vec3;

use netsync::{ObserverId, PeerConnection, TransportError};

use crate::world::SimRng;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkConditions {
    pub loss_percent: f32,
    pub latency: f64,
    pub jitter: f64,
}

/// In-memory transport to one observer. Delivery keeps send order even
/// with jitter, as the replication protocol expects.
#[derive(Debug)]
pub struct LoopbackPeer {
    id: ObserverId,
    pub position: Vec3,
    connected: bool,
    conditions: LinkConditions,
    rng: SimRng,
    clock: f64,
    last_release: f64,
    queue: VecDeque<(f64, Bytes)>,
    pub sent: u64,
    pub dropped: u64,
}

impl LoopbackPeer {
    pub fn new(id: ObserverId, position: Vec3, conditions: LinkConditions, seed: u64) -> Self {
        Self {
            id,
            position,
            connected: true,
            conditions,
            rng: SimRng::new(seed),
            clock: 0.0,
            last_release: 0.0,
            queue: VecDeque::new(),
            sent: 0,
            dropped: 0,
        }
    }

    /// Time stamp used for batches sent from now on.
    pub fn set_clock(&mut self, now: f64) {
        self.clock = now;
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if !connected {
            self.queue.clear();
        }
    }

    /// Batches whose delivery time has come.
    pub fn drain(&mut self, now: f64) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some((release, _)) = self.queue.front() {
            if *release > now {
                break;
            }
            if let Some((_, batch)) = self.queue.pop_front() {
                out.push(batch);
            }
        }
        out
    }
}

impl PeerConnection for LoopbackPeer {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn reference_position(&self) -> Vec3 {
        self.position
    }

    fn send(&mut self, batch: Bytes) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        self.sent += 1;
        if self.rng.chance(self.conditions.loss_percent) {
            self.dropped += 1;
            return Ok(());
        }

        let jitter = self.rng.next_f32() as f64 * self.conditions.jitter;
        let release = (self.clock + self.conditions.latency + jitter).max(self.last_release);
        self.last_release = release;
        self.queue.push_back((release, batch));
        Ok(())
    }
}
