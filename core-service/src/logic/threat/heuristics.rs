//! Detection Heuristics
//!
//! Both checks here are probabilistic signals, not proofs:
//!
//! - The timing check flags a debugger by measuring a fixed-cost workload.
//!   Heavy system load makes the same workload slow, so it also produces
//!   false positives.
//! - The "entropy" value is a SHA-256 of volatile resource counters and the
//!   wall clock mapped onto [0, 1). It is a pseudo-random proxy, not an
//!   information-theoretic entropy estimate, and the spike tracker below only
//!   detects repeated fluctuation of it - not scanning activity as such.

use std::hint::black_box;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::signal::ResourceSample;
use super::types::{Severity, ThreatEvent, ThreatKind};

/// Smoothing factor of the entropy baseline
const BASELINE_ALPHA: f64 = 0.1;

// ============================================================================
// DEBUGGER TIMING
// ============================================================================

/// Run the fixed-cost workload and return how long it took.
pub fn timed_workload(iterations: u32) -> Duration {
    let start = Instant::now();
    let mut acc: u64 = 0x9E37_79B9_7F4A_7C15;
    for i in 0..iterations {
        acc = black_box(acc.rotate_left(5) ^ u64::from(i)).wrapping_mul(0x100_0000_01B3);
    }
    black_box(acc);
    start.elapsed()
}

/// MEDIUM `DEBUGGER_DETECTED` when `elapsed` exceeds `threshold`.
pub fn evaluate_timing(elapsed: Duration, threshold: Duration) -> Option<ThreatEvent> {
    if elapsed <= threshold {
        return None;
    }
    Some(
        ThreatEvent::new(
            ThreatKind::DebuggerDetected,
            Severity::Medium,
            format!(
                "Timing workload took {}us (threshold {}us) - possible debugger or heavy load",
                elapsed.as_micros(),
                threshold.as_micros()
            ),
        )
        .with_detail("elapsed_us", elapsed.as_micros())
        .with_detail("threshold_us", threshold.as_micros()),
    )
}

// ============================================================================
// ENTROPY PROXY
// ============================================================================

/// Reproducible pseudo-random scalar in [0, 1) from counters + wall clock.
pub fn entropy_proxy(sample: &ResourceSample, now: DateTime<Utc>) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(sample.used_memory.to_be_bytes());
    hasher.update(sample.total_memory.to_be_bytes());
    hasher.update((sample.process_count as u64).to_be_bytes());
    hasher.update(sample.uptime_secs.to_be_bytes());
    hasher.update(sample.load_average.to_bits().to_be_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    // top 53 bits -> exact f64 in [0, 1)
    (u64::from_be_bytes(head) >> 11) as f64 / (1u64 << 53) as f64
}

/// Baseline + spike counter over successive entropy readings.
#[derive(Debug, Clone)]
pub struct EntropyTracker {
    baseline: Option<f64>,
    spikes: u32,
    delta: f64,
}

impl EntropyTracker {
    pub fn new(delta: f64) -> Self {
        Self {
            baseline: None,
            spikes: 0,
            delta,
        }
    }

    pub fn spikes(&self) -> u32 {
        self.spikes
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Feed one reading. Fires once the spike counter exceeds `limit`,
    /// then resets; readings within the delta decay the counter.
    pub fn observe(&mut self, value: f64, limit: u32) -> Option<ThreatEvent> {
        let baseline = match self.baseline {
            Some(b) => b,
            None => {
                self.baseline = Some(value);
                return None;
            }
        };

        let deviation = (value - baseline).abs();
        self.baseline = Some(baseline + BASELINE_ALPHA * (value - baseline));

        if deviation <= self.delta {
            self.spikes = self.spikes.saturating_sub(1);
            return None;
        }

        self.spikes += 1;
        if self.spikes <= limit {
            return None;
        }

        let count = self.spikes;
        self.spikes = 0;
        Some(
            ThreatEvent::new(
                ThreatKind::EntropySpike,
                Severity::Medium,
                format!("Entropy proxy deviated from baseline {} times in a row", count),
            )
            .with_detail("deviation", format!("{:.3}", deviation))
            .with_detail("baseline", format!("{:.3}", baseline)),
        )
    }
}
