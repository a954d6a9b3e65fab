//! Client half of the protocol: per-entity history rings fed by received
//! batches, and a per-frame reconciler that smooths rendered proxies.

mod config;
mod history;
mod reconciler;

pub use config::{ClientConfig, DEFAULT_INTERPOLATION_DELAY};
pub use history::{HistoryBuffer, StatePoint};
pub use reconciler::{Sample, SampleMode, blend, sample};

use std::collections::HashMap;

use crate::config::ReplicationConfig;
use crate::host::RenderScene;
use crate::quant::QuantizationConfig;
use crate::snapshot::EntityId;
use crate::stats::ClientStats;
use crate::wire::{DeltaBatchReader, DeltaRecord};

#[derive(Debug)]
pub struct ReplicationClient {
    config: ClientConfig,
    quantization: QuantizationConfig,
    histories: HashMap<EntityId, HistoryBuffer>,
    rendered: Vec<EntityId>,
    stats: ClientStats,
}

impl ReplicationClient {
    pub fn new(config: ClientConfig, quantization: QuantizationConfig) -> Self {
        Self {
            config,
            quantization,
            histories: HashMap::new(),
            rendered: Vec::new(),
            stats: ClientStats::default(),
        }
    }

    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self::new(config.client.clone(), config.quantization)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn history(&self, id: EntityId) -> Option<&HistoryBuffer> {
        self.histories.get(&id)
    }

    pub fn tracked_entities(&self) -> usize {
        self.histories.len()
    }

    /// Ids of every entity with received history.
    pub fn tracked(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.histories.keys().copied()
    }

    /// Decodes a batch and records every valid record at local time `now`.
    /// Records before a malformed one stay applied. Returns the number applied.
    pub fn receive_batch(&mut self, batch: &[u8], now: f64) -> usize {
        self.stats.batches_received += 1;

        let mut applied = 0;
        for (index, record) in DeltaBatchReader::new(batch, self.quantization).enumerate() {
            match record {
                Ok(record) => {
                    self.apply(record, now);
                    applied += 1;
                }
                Err(e) => {
                    log::warn!("malformed batch at record {index}: {e}");
                    self.stats.malformed_batches += 1;
                    break;
                }
            }
        }

        self.stats.records_applied += applied as u64;
        self.stats.tracked_entities = self.histories.len();
        applied
    }

    fn apply(&mut self, record: DeltaRecord, now: f64) {
        let depth = self.config.history_depth.get(record.zone);
        let history = self
            .histories
            .entry(record.id)
            .or_insert_with(|| HistoryBuffer::new(depth));

        let base = history.try_get_last().map(|p| p.state).unwrap_or_default();
        if history.capacity() != depth {
            history.resize(depth);
        }
        history.push(StatePoint {
            timestamp: now,
            state: record.delta.apply_to(&base),
            zone: record.zone,
        });
    }

    /// Per-frame smoothing of every rendered proxy toward its sampled state.
    pub fn reconcile<R: RenderScene + ?Sized>(&mut self, now: f64, dt: f32, scene: &mut R) {
        let target_time = now - self.config.interpolation_delay;

        self.rendered.clear();
        scene.rendered(&mut self.rendered);

        self.stats.interpolated = 0;
        self.stats.extrapolated = 0;
        self.stats.untouched = 0;

        for &id in &self.rendered {
            let Some(predicted) = self
                .histories
                .get(&id)
                .and_then(|h| sample(h, target_time, &self.config))
            else {
                self.stats.untouched += 1;
                continue;
            };

            let current = scene.transform(id).unwrap_or(predicted.target);
            scene.write_transform(id, blend(current, &predicted, dt, &self.config));

            match predicted.mode {
                SampleMode::Interpolated => self.stats.interpolated += 1,
                SampleMode::Extrapolated => self.stats.extrapolated += 1,
            }
        }
    }

    pub fn on_disconnect(&mut self) {
        log::info!("disconnected, clearing {} histories", self.histories.len());
        self.clear();
    }

    pub fn on_reconnect(&mut self) {
        log::info!("reconnected, starting from empty history");
        self.clear();
    }

    fn clear(&mut self) {
        self.histories.clear();
        self.stats.tracked_entities = 0;
    }
}
