// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latency distribution (used for time-to-first-audio)
#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub count: Arc<AtomicU64>,
    pub total_ms: Arc<AtomicU64>,
    pub min_ms: Arc<AtomicU64>,
    pub max_ms: Arc<AtomicU64>,
    // Last 1000 samples, for percentiles
    pub samples: Arc<std::sync::Mutex<Vec<u64>>>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicU64::new(0)),
            total_ms: Arc::new(AtomicU64::new(0)),
            min_ms: Arc::new(AtomicU64::new(u64::MAX)),
            max_ms: Arc::new(AtomicU64::new(0)),
            samples: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self, latency_ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.samples.lock() {
            samples.push(latency_ms);
            if samples.len() > 1000 {
                samples.remove(0);
            }
        }
    }

    pub fn avg_ms(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    pub fn min(&self) -> u64 {
        match self.min_ms.load(Ordering::Relaxed) {
            u64::MAX => 0,
            v => v,
        }
    }

    pub fn max(&self) -> u64 {
        self.max_ms.load(Ordering::Relaxed)
    }

    pub fn p50_ms(&self) -> u64 {
        self.percentile(50)
    }

    pub fn p95_ms(&self) -> u64 {
        self.percentile(95)
    }

    pub fn p99_ms(&self) -> u64 {
        self.percentile(99)
    }

    fn percentile(&self, p: u8) -> u64 {
        if let Ok(samples) = self.samples.lock() {
            if samples.is_empty() {
                return 0;
            }
            let mut sorted = samples.clone();
            sorted.sort_unstable();
            let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
            sorted[index]
        } else {
            0
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-wide counters, shared by every stream of one `LocalTts`
#[derive(Debug, Clone)]
pub struct TtsMetrics {
    pub streams_started: Arc<AtomicU64>,
    pub streams_completed: Arc<AtomicU64>,
    pub streams_failed: Arc<AtomicU64>,
    pub streams_aborted: Arc<AtomicU64>,
    pub requests_sent: Arc<AtomicU64>,
    pub audio_bytes: Arc<AtomicU64>,
    pub chunked_requests: Arc<AtomicU64>,
    pub time_to_first_audio: LatencyStats,
}

impl TtsMetrics {
    pub fn new() -> Self {
        Self {
            streams_started: Arc::new(AtomicU64::new(0)),
            streams_completed: Arc::new(AtomicU64::new(0)),
            streams_failed: Arc::new(AtomicU64::new(0)),
            streams_aborted: Arc::new(AtomicU64::new(0)),
            requests_sent: Arc::new(AtomicU64::new(0)),
            audio_bytes: Arc::new(AtomicU64::new(0)),
            chunked_requests: Arc::new(AtomicU64::new(0)),
            time_to_first_audio: LatencyStats::new(),
        }
    }

    pub fn record_request(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio(&self, bytes: usize) {
        self.audio_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            streams_started: self.streams_started.load(Ordering::Relaxed),
            streams_completed: self.streams_completed.load(Ordering::Relaxed),
            streams_failed: self.streams_failed.load(Ordering::Relaxed),
            streams_aborted: self.streams_aborted.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            audio_bytes: self.audio_bytes.load(Ordering::Relaxed),
            chunked_requests: self.chunked_requests.load(Ordering::Relaxed),
            time_to_first_audio: LatencySnapshot {
                count: self.time_to_first_audio.count.load(Ordering::Relaxed),
                avg_ms: self.time_to_first_audio.avg_ms(),
                min_ms: self.time_to_first_audio.min(),
                max_ms: self.time_to_first_audio.max(),
                p50_ms: self.time_to_first_audio.p50_ms(),
                p95_ms: self.time_to_first_audio.p95_ms(),
                p99_ms: self.time_to_first_audio.p99_ms(),
            },
        }
    }
}

impl Default for TtsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub streams_started: u64,
    pub streams_completed: u64,
    pub streams_failed: u64,
    pub streams_aborted: u64,
    pub requests_sent: u64,
    pub audio_bytes: u64,
    pub chunked_requests: u64,
    pub time_to_first_audio: LatencySnapshot,
}

#[derive(Debug, Serialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

/// Milestones of a single stream. Each one is recorded once.
#[derive(Debug, Clone, Default)]
pub struct StreamTimings {
    first_push: Arc<OnceLock<Instant>>,
    synthesis_started: Arc<OnceLock<Instant>>,
    first_audio: Arc<OnceLock<Instant>>,
}

impl StreamTimings {
    pub fn mark_first_push(&self) {
        let _ = self.first_push.get_or_init(Instant::now);
    }

    /// Returns true the first time it is called.
    pub fn mark_started(&self) -> bool {
        self.synthesis_started.set(Instant::now()).is_ok()
    }

    /// Records the first audio chunk and returns time-to-first-audio the
    /// first time, when a push was seen.
    pub fn mark_first_audio(&self) -> Option<Duration> {
        self.first_audio.set(Instant::now()).ok()?;
        self.time_to_first_audio()
    }

    pub fn is_started(&self) -> bool {
        self.synthesis_started.get().is_some()
    }

    pub fn time_to_first_audio(&self) -> Option<Duration> {
        let push = self.first_push.get()?;
        let audio = self.first_audio.get()?;
        Some(audio.saturating_duration_since(*push))
    }
}
