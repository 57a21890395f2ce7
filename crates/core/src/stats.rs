//! Per-stream running statistics, logged periodically for observability.

use crate::config::STATS_LOG_INTERVAL_FRAMES;

/// Online mean/variance accumulator (Welford's algorithm), used for
/// both process-time and inter-arrival statistics so a long-running
/// stream doesn't need to retain per-frame history.
#[derive(Debug, Default, Clone, Copy)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, sample: f64) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = sample - self.mean;
        self.m2 += delta * delta2;
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }
}

/// Tracks frame throughput, inter-arrival jitter, and processing latency
/// for one media track, logging a summary every
/// [`STATS_LOG_INTERVAL_FRAMES`] frames.
pub struct StreamStats {
    label: &'static str,
    frame_count: u64,
    last_arrival_us: Option<i64>,
    inter_arrival: Welford,
    process_time: Welford,
}

impl StreamStats {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            frame_count: 0,
            last_arrival_us: None,
            inter_arrival: Welford::default(),
            process_time: Welford::default(),
        }
    }

    /// Records that a frame with the given presentation timestamp
    /// arrived from the encoder tap.
    pub fn on_frame_available(&mut self, presentation_time_us: i64) {
        if let Some(last) = self.last_arrival_us {
            self.inter_arrival.push((presentation_time_us - last) as f64);
        }
        self.last_arrival_us = Some(presentation_time_us);
    }

    /// Records that a frame finished being sent, `process_time_us`
    /// microseconds after it became available.
    pub fn on_frame_sent(&mut self, process_time_us: f64) {
        self.frame_count += 1;
        self.process_time.push(process_time_us);

        if self.frame_count % STATS_LOG_INTERVAL_FRAMES == 0 {
            tracing::info!(
                stream = self.label,
                frames = self.frame_count,
                mean_inter_arrival_us = self.inter_arrival.mean,
                inter_arrival_variance = self.inter_arrival.variance(),
                mean_process_time_us = self.process_time.mean,
                process_time_variance = self.process_time.variance(),
                "stream stats"
            );
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_naive_mean_and_variance() {
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut w = Welford::default();
        for &s in &samples {
            w.push(s);
        }
        let naive_mean: f64 = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((w.mean - naive_mean).abs() < 1e-9);

        let naive_var: f64 = samples.iter().map(|s| (s - naive_mean).powi(2)).sum::<f64>()
            / (samples.len() - 1) as f64;
        assert!((w.variance() - naive_var).abs() < 1e-9);
    }

    #[test]
    fn stream_stats_tracks_frame_count() {
        let mut stats = StreamStats::new("video");
        stats.on_frame_available(0);
        stats.on_frame_available(33_000);
        stats.on_frame_sent(500.0);
        stats.on_frame_sent(600.0);
        assert_eq!(stats.frame_count(), 2);
    }

    #[test]
    fn process_time_reflects_the_reported_samples() {
        let mut stats = StreamStats::new("video");
        stats.on_frame_sent(500.0);
        stats.on_frame_sent(600.0);
        // A caller that always reports 0.0 (a disguised no-op) would
        // leave this at 0 regardless of the samples above.
        assert!((stats.process_time.mean - 550.0).abs() < 1e-9);
    }
}
