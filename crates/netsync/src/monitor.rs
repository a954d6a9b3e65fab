use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

const SAMPLE_COUNT: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Average frame time above which the server steps down one profile row.
    pub degraded_frame_time: f32,
    /// Samples required before the monitor reports degradation.
    pub min_samples: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            degraded_frame_time: 0.033,
            min_samples: 10,
        }
    }
}

/// Rolling window of frame times and packets sent per frame.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    config: MonitorConfig,
    frame_times: VecDeque<f32>,
    packets: VecDeque<u32>,
    frame_time_sum: f32,
    packet_sum: u64,
    degraded: bool,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            frame_times: VecDeque::with_capacity(SAMPLE_COUNT),
            packets: VecDeque::with_capacity(SAMPLE_COUNT),
            frame_time_sum: 0.0,
            packet_sum: 0,
            degraded: false,
        }
    }

    /// Records one frame. Returns `true` when the degraded state flips.
    pub fn record_frame(&mut self, frame_time: f32, packets_sent: u32) -> bool {
        if !frame_time.is_finite() || frame_time < 0.0 {
            return false;
        }

        if self.frame_times.len() >= SAMPLE_COUNT {
            if let Some(old) = self.frame_times.pop_front() {
                self.frame_time_sum -= old;
            }
            if let Some(old) = self.packets.pop_front() {
                self.packet_sum -= old as u64;
            }
        }
        self.frame_times.push_back(frame_time);
        self.packets.push_back(packets_sent);
        self.frame_time_sum += frame_time;
        self.packet_sum += packets_sent as u64;

        let degraded = self.frame_times.len() >= self.config.min_samples
            && self.average_frame_time() > self.config.degraded_frame_time;
        let changed = degraded != self.degraded;
        self.degraded = degraded;

        if changed && degraded {
            log::warn!(
                "performance degraded: avg frame {:.3}s, {:.1} packets/frame",
                self.average_frame_time(),
                self.average_packets()
            );
        } else if changed {
            log::info!("performance recovered: avg frame {:.3}s", self.average_frame_time());
        }
        changed
    }

    pub fn average_frame_time(&self) -> f32 {
        if self.frame_times.is_empty() {
            0.0
        } else {
            (self.frame_time_sum / self.frame_times.len() as f32).max(0.0)
        }
    }

    pub fn average_packets(&self) -> f32 {
        if self.packets.is_empty() {
            0.0
        } else {
            self.packet_sum as f32 / self.packets.len() as f32
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn sample_count(&self) -> usize {
        self.frame_times.len()
    }

    pub fn reset(&mut self) {
        self.frame_times.clear();
        self.packets.clear();
        self.frame_time_sum = 0.0;
        self.packet_sum = 0;
        self.degraded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_frames_degrade_after_min_samples() {
        let mut monitor = PerformanceMonitor::default();
        for _ in 0..9 {
            assert!(!monitor.record_frame(0.05, 2));
        }
        assert!(!monitor.is_degraded());
        assert!(monitor.record_frame(0.05, 2));
        assert!(monitor.is_degraded());
        assert!((monitor.average_packets() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn window_slides_back_to_healthy() {
        let mut monitor = PerformanceMonitor::default();
        for _ in 0..SAMPLE_COUNT {
            monitor.record_frame(0.05, 0);
        }
        assert!(monitor.is_degraded());
        for _ in 0..SAMPLE_COUNT {
            monitor.record_frame(0.016, 0);
        }
        assert_eq!(monitor.sample_count(), SAMPLE_COUNT);
        assert!(!monitor.is_degraded());
        assert!((monitor.average_frame_time() - 0.016).abs() < 1e-3);
    }

    #[test]
    fn ignores_invalid_samples() {
        let mut monitor = PerformanceMonitor::default();
        monitor.record_frame(f32::NAN, 1);
        monitor.record_frame(-1.0, 1);
        assert_eq!(monitor.sample_count(), 0);
    }
}
