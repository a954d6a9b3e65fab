//! Server half of the protocol: fixed-rate ticks that diff every in-interest
//! entity against what each observer last received and ship the changes.

mod baseline;
mod profile;
mod timestep;

pub use baseline::{BaselineConfig, BaselineTable};
pub use profile::{ProfileTable, TickProfile};
pub use timestep::FixedTimestep;

use std::collections::HashMap;

use crate::config::{ConfigError, ReplicationConfig};
use crate::delta::{first_contact, make_delta};
use crate::host::{EntitySource, ObserverId, PeerConnection};
use crate::monitor::PerformanceMonitor;
use crate::snapshot::{EntityId, Snapshot};
use crate::stats::ServerStats;
use crate::wire::DeltaBatchWriter;
use crate::zone::InterestZones;

const SUMMARY_INTERVAL: u64 = 60;

#[derive(Debug)]
pub struct ReplicationServer {
    config: ReplicationConfig,
    interest: InterestZones,
    timestep: FixedTimestep,
    tick: u64,
    baselines: HashMap<ObserverId, BaselineTable>,
    next_observer: usize,
    profile_index: usize,
    profile: TickProfile,
    monitor: PerformanceMonitor,
    writer: DeltaBatchWriter,
    frame: Vec<(EntityId, Snapshot)>,
    pending: Vec<(EntityId, Snapshot)>,
    idle: bool,
    stats: ServerStats,
}

impl ReplicationServer {
    pub fn new(config: ReplicationConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let profile_index = config.profiles.select_index(0);
        let profile = config.profiles.rows()[profile_index];
        let stats = ServerStats {
            profile_index,
            tick_rate_hz: profile.tick_rate_hz,
            ..Default::default()
        };

        Ok(Self {
            interest: config.zones.interest(),
            timestep: FixedTimestep::new(profile.tick_rate_hz, config.server.max_catch_up_ticks),
            tick: 0,
            baselines: HashMap::new(),
            next_observer: 0,
            profile_index,
            profile,
            monitor: PerformanceMonitor::new(config.monitor),
            writer: DeltaBatchWriter::new(config.quantization),
            frame: Vec::new(),
            pending: Vec::new(),
            idle: true,
            stats,
            config,
        })
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Number of ticks executed so far. The first tick is 1.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn profile(&self) -> &TickProfile {
        &self.profile
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn baseline_count(&self, observer: ObserverId) -> usize {
        self.baselines.get(&observer).map_or(0, BaselineTable::len)
    }

    pub fn observer_connected(&mut self, observer: ObserverId) {
        log::info!("{observer} connected");
        self.baselines.insert(observer, BaselineTable::new());
    }

    pub fn observer_disconnected(&mut self, observer: ObserverId) {
        if let Some(table) = self.baselines.remove(&observer) {
            log::info!("{observer} disconnected, dropped {} baselines", table.len());
        }
    }

    /// Forgets baselines so the next due tick sends full state. `None`
    /// resyncs every observer.
    pub fn request_full_resync(&mut self, observer: Option<ObserverId>) {
        match observer {
            Some(observer) => {
                log::info!("full resync requested for {observer}");
                if let Some(table) = self.baselines.get_mut(&observer) {
                    table.clear();
                }
            }
            None => {
                log::info!("full resync requested for all observers");
                for table in self.baselines.values_mut() {
                    table.clear();
                }
            }
        }
        self.stats.full_resyncs += 1;
    }

    /// Session teardown.
    pub fn reset(&mut self) {
        self.baselines.clear();
        self.timestep.reset();
        self.monitor.reset();
        self.next_observer = 0;
        self.tick = 0;
        self.idle = true;
    }

    /// Host frame callback. Runs as many ticks as `dt` covers, up to the
    /// catch-up cap, and returns how many ran.
    pub fn advance<S, P>(&mut self, dt: f32, source: &S, peers: &mut [P]) -> u32
    where
        S: EntitySource + ?Sized,
        P: PeerConnection,
    {
        let connected = peers.iter().filter(|p| p.is_connected()).count();
        if connected == 0 {
            if !self.idle {
                log::debug!("no observers connected, replication idle");
                self.idle = true;
            }
            self.timestep.reset();
            return 0;
        }
        self.idle = false;

        self.select_profile(connected);
        self.timestep.accumulate(dt);

        let mut ticks = 0;
        let mut batches = 0;
        while ticks < self.timestep.max_catch_up() && self.timestep.consume_tick() {
            batches += self.run_tick(source, peers);
            ticks += 1;
        }

        let dropped = self.timestep.drop_backlog();
        if dropped > 0 {
            log::debug!("catch-up cap reached, dropped {dropped} ticks");
            self.stats.ticks_dropped += dropped as u64;
        }

        if self.config.server.adaptive {
            self.monitor.record_frame(dt, batches);
        }
        ticks
    }

    fn select_profile(&mut self, connected: usize) {
        let degraded = self.config.server.adaptive && self.monitor.is_degraded();
        let index = self.config.profiles.select_index_with(connected, degraded);
        if index == self.profile_index {
            return;
        }

        let Some(profile) = self.config.profiles.get(index).copied() else {
            return;
        };
        log::info!(
            "profile {} -> {} ({connected} observers{}): {} Hz, {} observers/tick",
            self.profile_index,
            index,
            if degraded { ", degraded" } else { "" },
            profile.tick_rate_hz,
            profile.observers_per_tick,
        );
        self.profile_index = index;
        self.profile = profile;
        self.timestep.set_tick_rate(profile.tick_rate_hz);
        self.stats.profile_index = index;
        self.stats.tick_rate_hz = profile.tick_rate_hz;
    }

    fn run_tick<S, P>(&mut self, source: &S, peers: &mut [P]) -> u32
    where
        S: EntitySource + ?Sized,
        P: PeerConnection,
    {
        self.tick += 1;
        self.stats.ticks_run += 1;
        let tick = self.tick;

        self.frame.clear();
        source.capture(&mut self.frame);

        let count = peers.len();
        let budget = self.profile.observers_per_tick;
        let start = self.next_observer % count.max(1);
        let mut serviced = 0;
        let mut visited = 0;
        let mut batches = 0;

        while serviced < budget && visited < count {
            let peer = &mut peers[(start + visited) % count];
            visited += 1;
            if !peer.is_connected() {
                continue;
            }
            serviced += 1;
            if self.service_observer(peer, tick) {
                batches += 1;
            }
        }
        self.next_observer = (start + visited) % count.max(1);

        if tick % self.config.baseline.sweep_interval == 0 {
            self.sweep_baselines(tick);
        }

        if tick % SUMMARY_INTERVAL == 0 {
            log::trace!(
                "tick {tick}: {} entities, {} batches, {} bytes total",
                self.frame.len(),
                self.stats.batches_sent,
                self.stats.bytes_sent
            );
        }
        batches
    }

    /// Builds and sends one observer's batch. Returns whether a batch went out.
    fn service_observer<P: PeerConnection>(&mut self, peer: &mut P, tick: u64) -> bool {
        let observer = peer.observer_id();
        let origin = peer.reference_position();
        let profile = self.profile;
        let thresholds = &self.config.thresholds;
        let baselines = self.baselines.entry(observer).or_default();

        self.writer.clear();
        self.pending.clear();

        for (id, current) in &self.frame {
            let Some(zone) = self.interest.classify_between(origin, current.position) else {
                continue;
            };
            baselines.touch(*id, tick);
            if !profile.is_due(zone, tick) {
                continue;
            }

            let (delta, base) = match baselines.get(*id) {
                Some(previous) => (make_delta(previous, current, thresholds), *previous),
                None => (first_contact(current), Snapshot::EMPTY),
            };
            if !delta.has_any() {
                continue;
            }
            if self.writer.len() >= profile.entity_budget {
                self.stats.budget_deferrals += 1;
                continue;
            }

            self.writer.push(*id, zone, &delta);
            // The observer only learns the masked fields.
            self.pending.push((*id, delta.apply_to(&base)));
        }

        if self.writer.is_empty() {
            return false;
        }

        let records = self.writer.len();
        let batch = self.writer.take();
        let size = batch.len();
        match peer.send(batch) {
            Ok(()) => {
                for (id, sent) in self.pending.drain(..) {
                    baselines.store(id, sent, tick);
                }
                self.stats.batches_sent += 1;
                self.stats.bytes_sent += size as u64;
                self.stats.records_written += records as u64;
                true
            }
            Err(e) => {
                log::warn!("send to {observer} failed: {e}");
                self.stats.send_failures += 1;
                self.pending.clear();
                false
            }
        }
    }

    fn sweep_baselines(&mut self, tick: u64) {
        let mut evicted = 0;
        for table in self.baselines.values_mut() {
            evicted += table.sweep(tick, &self.config.baseline);
        }
        if evicted > 0 {
            log::debug!("tick {tick}: evicted {evicted} baselines");
            self.stats.baselines_evicted += evicted as u64;
        }
    }
}
