use super::types::{DerivedMetrics, ProgressSample};

/// Turns backend progress callbacks into percentage, throughput and ETA.
///
/// Only the previous sample is kept. Throughput is the instantaneous rate
/// between the two most recent callbacks.
#[derive(Debug, Clone, Default)]
pub struct ProgressEstimator {
    total_bytes: u64,
    previous: Option<ProgressSample>,
    metrics: DerivedMetrics,
}

impl ProgressEstimator {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            previous: None,
            metrics: DerivedMetrics::default(),
        }
    }

    /// Feed one sample and get the refreshed metrics.
    pub fn observe(&mut self, sample: ProgressSample) -> DerivedMetrics {
        self.metrics = estimate(self.total_bytes, self.previous, sample, self.metrics.throughput);
        self.previous = Some(sample);
        self.metrics
    }

    /// Forget the previous sample so the next one starts a new delta.
    /// Called on resume: the paused interval is not transfer time.
    pub fn rebaseline(&mut self) {
        self.previous = None;
    }

    /// Backend acknowledged the whole file.
    pub fn complete(&mut self) -> DerivedMetrics {
        self.metrics.percent_complete = 100;
        self.metrics.eta_seconds = Some(0);
        self.metrics
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.metrics = DerivedMetrics::default();
    }

    pub fn metrics(&self) -> DerivedMetrics {
        self.metrics
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Metrics for `current`, given the sample before it and the last known
/// throughput (kept when no usable interval exists).
pub fn estimate(
    total_bytes: u64,
    previous: Option<ProgressSample>,
    current: ProgressSample,
    last_throughput: f64,
) -> DerivedMetrics {
    let throughput = match previous {
        Some(prev)
            if current.timestamp_ms > prev.timestamp_ms
                && current.bytes_transferred >= prev.bytes_transferred =>
        {
            let delta_bytes = (current.bytes_transferred - prev.bytes_transferred) as f64;
            let delta_secs = (current.timestamp_ms - prev.timestamp_ms) as f64 / 1000.0;
            delta_bytes / delta_secs
        }
        _ => last_throughput,
    };
    let throughput = if throughput.is_finite() && throughput > 0.0 { throughput } else { 0.0 };

    let remaining = total_bytes.saturating_sub(current.bytes_transferred);
    let eta_seconds = if remaining == 0 {
        Some(0)
    } else if throughput > 0.0 {
        Some((remaining as f64 / throughput).ceil() as u64)
    } else {
        None
    };

    DerivedMetrics {
        percent_complete: percent_complete(current.bytes_transferred, total_bytes),
        throughput,
        eta_seconds,
    }
}

/// Rounded percentage. Reads 100 only once every byte is acknowledged.
pub fn percent_complete(bytes_transferred: u64, total_bytes: u64) -> u8 {
    if bytes_transferred >= total_bytes {
        return 100;
    }

    let percent = (bytes_transferred as f64 / total_bytes as f64 * 100.0).round();
    percent.clamp(0.0, 99.0) as u8
}
