//! Transfer progress reporting.
//!
//! Long-running stages (image compression, upload packaging) report through
//! a shared callback so the frontend can render whatever it likes. The
//! library only produces snapshots; it never prints.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshots are emitted at most this often, plus once at completion.
const EMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Snapshot of a running transfer stage.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Payload bytes processed so far.
    pub transferred: u64,
    /// Total payload bytes, when known up front.
    pub total: u64,
    /// `transferred` over `total`, 0.0 to 100.0.
    pub percentage: f64,
    /// Estimated time to completion, once enough samples exist.
    pub eta: Option<Duration>,
}

/// Callback invoked with progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Callback for callers that do not observe progress.
pub fn progress_sink() -> ProgressCallback {
    Arc::new(|_| {})
}

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Transfer speed over a sliding window of samples.
pub struct SpeedCalculator {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 100)
    }
}

impl SpeedCalculator {
    pub fn new(window: Duration, max_samples: usize) -> Self {
        Self {
            samples: Vec::new(),
            max_samples,
            window,
        }
    }

    /// Records `bytes` transferred at the current instant.
    pub fn add_sample(&mut self, bytes: u64) {
        let now = Instant::now();
        self.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        let cutoff = now - self.window;
        self.samples.retain(|s| s.timestamp >= cutoff);

        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second within the window; 0.0 with fewer than
    /// two samples.
    pub fn bytes_per_second(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let first = &self.samples[0];
        let last = &self.samples[self.samples.len() - 1];
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }
        let total: u64 = self.samples.iter().map(|s| s.bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to transfer `remaining` bytes; `None` while speed is
    /// unknown.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }
}

/// Accumulates byte counts and emits throttled snapshots.
///
/// Owned by a single producer (the compressor or packager thread), so no
/// interior mutability is needed.
pub(crate) struct ProgressMeter {
    total: u64,
    transferred: u64,
    speed: SpeedCalculator,
    last_emit: Option<Instant>,
    callback: ProgressCallback,
}

impl ProgressMeter {
    pub(crate) fn new(total: u64, callback: ProgressCallback) -> Self {
        Self {
            total,
            transferred: 0,
            speed: SpeedCalculator::default(),
            last_emit: None,
            callback,
        }
    }

    pub(crate) fn add(&mut self, bytes: u64) {
        self.transferred += bytes;
        self.speed.add_sample(bytes);

        let due = self
            .last_emit
            .is_none_or(|at| at.elapsed() >= EMIT_INTERVAL);
        if due {
            self.emit();
        }
    }

    /// Emits the final snapshot.
    pub(crate) fn finish(&mut self) {
        self.emit();
    }

    fn emit(&mut self) {
        self.last_emit = Some(Instant::now());
        let percentage = if self.total == 0 {
            100.0
        } else {
            (self.transferred as f64 / self.total as f64) * 100.0
        };
        let remaining = self.total.saturating_sub(self.transferred);
        (self.callback)(TransferProgress {
            transferred: self.transferred,
            total: self.total,
            percentage,
            eta: self.speed.eta(remaining),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn speed_needs_two_samples() {
        let mut calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
        calc.add_sample(100);
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn speed_positive_after_samples() {
        let mut calc = SpeedCalculator::new(Duration::from_secs(10), 100);
        calc.add_sample(500);
        std::thread::sleep(Duration::from_millis(20));
        calc.add_sample(500);

        assert!(calc.bytes_per_second() > 0.0);
        assert!(calc.eta(10_000).is_some());
    }

    #[test]
    fn speed_sample_cap() {
        let mut calc = SpeedCalculator::new(Duration::from_secs(60), 5);
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        assert!(calc.samples.len() <= 5);
    }

    #[test]
    fn meter_reports_completion() {
        let seen: Arc<Mutex<Vec<TransferProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |p: TransferProgress| seen.lock().unwrap().push(p))
        };

        let mut meter = ProgressMeter::new(100, sink);
        meter.add(40);
        meter.add(60);
        meter.finish();

        let snapshots = seen.lock().unwrap();
        let last = snapshots.last().unwrap();
        assert_eq!(last.transferred, 100);
        assert_eq!(last.total, 100);
        assert!((last.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn meter_zero_total_is_complete() {
        let seen: Arc<Mutex<Vec<TransferProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |p: TransferProgress| seen.lock().unwrap().push(p))
        };

        let mut meter = ProgressMeter::new(0, sink);
        meter.finish();

        let snapshots = seen.lock().unwrap();
        assert!((snapshots[0].percentage - 100.0).abs() < f64::EPSILON);
    }
}
