use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::snapshot::{EntityId, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Entries not referenced for this many ticks are dropped on sweep.
    pub ttl_ticks: u64,
    /// Per-observer cap; the least recently referenced entries go first.
    pub max_entries: usize,
    pub sweep_interval: u64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            ttl_ticks: 600,
            max_entries: 8192,
            sweep_interval: 60,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    snapshot: Snapshot,
    last_referenced: u64,
}

/// Last snapshot successfully sent to one observer, per entity.
#[derive(Debug, Default)]
pub struct BaselineTable {
    entries: HashMap<EntityId, Entry>,
}

impl BaselineTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: EntityId) -> Option<&Snapshot> {
        self.entries.get(&id).map(|e| &e.snapshot)
    }

    /// Marks the entity as still in interest at `tick`.
    pub fn touch(&mut self, id: EntityId, tick: u64) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.last_referenced = tick;
        }
    }

    pub fn store(&mut self, id: EntityId, snapshot: Snapshot, tick: u64) {
        self.entries.insert(
            id,
            Entry {
                snapshot,
                last_referenced: tick,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops expired entries, then trims to `max_entries`. Returns the number
    /// of entries removed.
    pub fn sweep(&mut self, tick: u64, config: &BaselineConfig) -> usize {
        let before = self.entries.len();
        let ttl = config.ttl_ticks;
        self.entries
            .retain(|_, e| tick.saturating_sub(e.last_referenced) <= ttl);

        let excess = self.entries.len().saturating_sub(config.max_entries);
        if excess > 0 {
            let mut ages: Vec<u64> = self.entries.values().map(|e| e.last_referenced).collect();
            let (_, cutoff, _) = ages.select_nth_unstable(excess - 1);
            let cutoff = *cutoff;

            let mut to_remove = excess;
            self.entries.retain(|_, e| {
                if to_remove > 0 && e.last_referenced <= cutoff {
                    to_remove -= 1;
                    false
                } else {
                    true
                }
            });
        }

        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> EntityId {
        EntityId::new(1, n)
    }

    #[test]
    fn store_and_get() {
        let mut table = BaselineTable::new();
        assert!(table.get(id(1)).is_none());
        table.store(id(1), Snapshot::default().with_health(3), 0);
        assert_eq!(table.get(id(1)).map(|s| s.health), Some(3));
    }

    #[test]
    fn sweep_drops_expired() {
        let config = BaselineConfig {
            ttl_ticks: 10,
            ..Default::default()
        };
        let mut table = BaselineTable::new();
        table.store(id(1), Snapshot::default(), 0);
        table.store(id(2), Snapshot::default(), 0);
        table.touch(id(2), 15);

        assert_eq!(table.sweep(20, &config), 1);
        assert!(table.get(id(1)).is_none());
        assert!(table.get(id(2)).is_some());
    }

    #[test]
    fn sweep_caps_size_by_recency() {
        let config = BaselineConfig {
            ttl_ticks: 1000,
            max_entries: 3,
            sweep_interval: 1,
        };
        let mut table = BaselineTable::new();
        for n in 0..6u32 {
            table.store(id(n), Snapshot::default(), n as u64);
        }

        assert_eq!(table.sweep(10, &config), 3);
        assert_eq!(table.len(), 3);
        for n in 3..6 {
            assert!(table.get(id(n)).is_some());
        }
    }
}
