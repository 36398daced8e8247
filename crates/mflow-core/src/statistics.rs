use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Default capacity of the statistics ring.
pub const DEFAULT_STATISTICS_BUFFER_LENGTH: usize = 100;

/// One throughput sample, appended after each `processor.process` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSample {
    pub frame_index: i64,
    pub byte_length: usize,
    pub processing_time_seconds: f64,
}

/// Aggregates derived on demand from the ring.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total_frames: u64,
    pub total_bytes: u64,
    pub total_time_seconds: f64,
    pub frames_per_second: f64,
    pub bytes_per_second: f64,
}

/// Fixed-capacity FIFO of the most recent throughput samples. Appended-to
/// only by the processor worker; read concurrently by HTTP handlers. Never
/// exceeds its configured capacity; the newest element corresponds to the
/// most recently processed message.
pub struct Statistics {
    capacity: usize,
    samples: Mutex<VecDeque<StatisticsSample>>,
}

impl Statistics {
    pub fn new(capacity: usize) -> Self {
        Statistics {
            capacity: capacity.max(1),
            samples: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn push(&self, sample: StatisticsSample) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Copy of the ring, oldest first.
    pub fn raw(&self) -> Vec<StatisticsSample> {
        self.samples.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    /// Aggregated rates over the current ring contents. Time/rate fields are
    /// derived from the span between the oldest and newest sample's own
    /// `processing_time_seconds`, summed, not wall-clock elapsed time.
    pub fn aggregate(&self) -> StatisticsSnapshot {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return StatisticsSnapshot::default();
        }
        let total_frames = samples.len() as u64;
        let total_bytes: u64 = samples.iter().map(|s| s.byte_length as u64).sum();
        let total_time_seconds: f64 = samples.iter().map(|s| s.processing_time_seconds).sum();
        let (frames_per_second, bytes_per_second) = if total_time_seconds > 0.0 {
            (
                total_frames as f64 / total_time_seconds,
                total_bytes as f64 / total_time_seconds,
            )
        } else {
            (0.0, 0.0)
        };
        StatisticsSnapshot {
            total_frames,
            total_bytes,
            total_time_seconds,
            frames_per_second,
            bytes_per_second,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(frame_index: i64, byte_length: usize, t: f64) -> StatisticsSample {
        StatisticsSample {
            frame_index,
            byte_length,
            processing_time_seconds: t,
        }
    }

    #[test]
    fn ring_never_exceeds_capacity() {
        let stats = Statistics::new(3);
        for i in 0..10 {
            stats.push(sample(i, 1, 0.001));
        }
        assert_eq!(stats.len(), 3);
    }

    #[test]
    fn newest_sample_is_most_recent() {
        let stats = Statistics::new(3);
        for i in 0..5 {
            stats.push(sample(i, 1, 0.001));
        }
        let raw = stats.raw();
        assert_eq!(raw.last().unwrap().frame_index, 4);
    }

    #[test]
    fn aggregate_sums_frames_and_bytes() {
        let stats = Statistics::new(100);
        stats.push(sample(0, 10, 0.1));
        stats.push(sample(1, 20, 0.1));
        let agg = stats.aggregate();
        assert_eq!(agg.total_frames, 2);
        assert_eq!(agg.total_bytes, 30);
        assert!((agg.total_time_seconds - 0.2).abs() < 1e-9);
        assert!((agg.frames_per_second - 10.0).abs() < 1e-6);
    }

    #[test]
    fn empty_ring_aggregates_to_zero() {
        let stats = Statistics::new(10);
        assert_eq!(stats.aggregate(), StatisticsSnapshot::default());
    }
}
