use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub ticks_run: u64,
    /// Whole tick intervals discarded because the catch-up cap was hit.
    pub ticks_dropped: u64,
    pub batches_sent: u64,
    pub bytes_sent: u64,
    pub records_written: u64,
    pub send_failures: u64,
    /// Entities skipped because an observer's per-tick budget was full.
    pub budget_deferrals: u64,
    pub baselines_evicted: u64,
    pub full_resyncs: u64,
    pub profile_index: usize,
    pub tick_rate_hz: u32,
}

impl ServerStats {
    pub fn average_batch_bytes(&self) -> f64 {
        if self.batches_sent == 0 {
            0.0
        } else {
            self.bytes_sent as f64 / self.batches_sent as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub batches_received: u64,
    pub records_applied: u64,
    pub malformed_batches: u64,
    pub tracked_entities: usize,
    pub interpolated: usize,
    pub extrapolated: usize,
    pub untouched: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_batch_size() {
        let mut stats = ServerStats::default();
        assert_eq!(stats.average_batch_bytes(), 0.0);
        stats.batches_sent = 4;
        stats.bytes_sent = 100;
        assert_eq!(stats.average_batch_bytes(), 25.0);
    }
}
