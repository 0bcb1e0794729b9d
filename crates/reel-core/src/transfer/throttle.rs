//! Bandwidth throttle shared by the workers of one transfer.
//!
//! Keeps an exponential moving average of per-stream throughput, measured
//! over each chunk's own transfer time. When the average exceeds the
//! stream's share of the cap, the worker that just finished a chunk sleeps
//! for `chunk_bytes / share` before taking the next one. A single chunk is
//! never slowed down mid-flight, so bursts of up to one chunk pass through.

use std::sync::Mutex;
use std::time::Duration;

use crate::control::CancelToken;

/// Weight of the newest sample in the moving average.
const EMA_ALPHA: f64 = 0.3;

/// Shortest busy interval accepted when computing a rate.
const MIN_SAMPLE: Duration = Duration::from_micros(1);

#[derive(Debug)]
pub struct Throttle {
    cap: Option<u64>,
    streams: u32,
    ema: Mutex<Option<f64>>,
}

impl Throttle {
    /// `cap` is the aggregate bytes/sec ceiling (None = unthrottled);
    /// `streams` is the number of workers sharing it.
    pub fn new(cap: Option<u64>, streams: usize) -> Self {
        Self {
            cap: cap.filter(|c| *c > 0),
            streams: streams.max(1) as u32,
            ema: Mutex::new(None),
        }
    }

    pub fn is_limited(&self) -> bool {
        self.cap.is_some()
    }

    /// Per-stream share of the cap, in bytes/sec.
    fn share(&self) -> Option<f64> {
        self.cap.map(|c| c as f64 / self.streams as f64)
    }

    /// Record a chunk of `bytes` that took `busy` to transfer and return the
    /// pause the worker should take before its next chunk.
    pub fn delay_for(&self, bytes: u64, busy: Duration) -> Option<Duration> {
        let busy = busy.max(MIN_SAMPLE);
        let sample = bytes as f64 / busy.as_secs_f64();
        let avg = {
            let mut ema = self.ema.lock().unwrap_or_else(|e| e.into_inner());
            let next = match *ema {
                Some(prev) => EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * prev,
                None => sample,
            };
            *ema = Some(next);
            next
        };
        let share = self.share()?;
        if avg > share && bytes > 0 {
            Some(Duration::from_secs_f64(bytes as f64 / share))
        } else {
            None
        }
    }

    /// Record a chunk and sleep if needed. Returns `false` if cancelled while sleeping.
    pub fn pace(&self, bytes: u64, busy: Duration, cancel: &CancelToken) -> bool {
        match self.delay_for(bytes, busy) {
            Some(d) => {
                tracing::trace!(bytes, delay_ms = d.as_millis() as u64, "throttling");
                cancel.sleep(d)
            }
            None => true,
        }
    }

    /// Current aggregate throughput estimate in bytes/sec.
    pub fn measured_rate(&self) -> Option<f64> {
        let ema = *self.ema.lock().unwrap_or_else(|e| e.into_inner());
        ema.map(|r| r * self.streams as f64)
    }
}
