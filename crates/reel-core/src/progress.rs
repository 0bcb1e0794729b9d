//! Progress reporting for pipeline stages (bytes done, rate, percent).
//!
//! Stages feed raw counters into a `ProgressTracker`, which turns them into
//! `ProgressEvent`s only when the displayed value changes and hands them to
//! the caller's `ProgressReporter`. Reporter failures are logged and dropped;
//! they never fail a job.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Downloading,
    Compositing,
    Remuxing,
    Uploading,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Downloading => "downloading",
            Phase::Compositing => "compositing",
            Phase::Remuxing => "remuxing",
            Phase::Uploading => "uploading",
        };
        f.pad(s)
    }
}

/// Snapshot of one stage's progress.
///
/// For `Compositing`, `bytes_done`/`bytes_total` count frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    pub elapsed: Duration,
    /// Units per second since the phase started.
    pub rate: f64,
}

impl ProgressEvent {
    /// Whole percent complete, when the total is known.
    pub fn percent(&self) -> Option<u8> {
        let total = self.bytes_total?;
        if total == 0 {
            return Some(100);
        }
        let pct = (self.bytes_done.min(total) as u128 * 100 / total as u128) as u8;
        Some(pct)
    }

    /// Estimated time remaining (None if total unknown or rate is 0).
    pub fn eta(&self) -> Option<Duration> {
        let total = self.bytes_total?;
        let remaining = total.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        if self.rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / self.rate))
    }
}

/// Receives progress events. Implementations may fail; the core ignores failures.
pub trait ProgressReporter: Send + Sync {
    fn notify(&self, event: &ProgressEvent) -> anyhow::Result<()>;
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn notify(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn notify(&self, _event: &ProgressEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn notify(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        match event.percent() {
            Some(pct) => tracing::info!(phase = %event.phase, percent = pct, done = event.bytes_done, "progress"),
            None => tracing::info!(phase = %event.phase, done = event.bytes_done, "progress"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Shown {
    Percent(u8),
    Mebibytes(u64),
}

/// Throttles raw counter updates for one phase into reporter events.
pub struct ProgressTracker {
    phase: Phase,
    total: Option<u64>,
    start: Instant,
    last_shown: Option<Shown>,
    reporter: Arc<dyn ProgressReporter>,
}

impl ProgressTracker {
    pub fn new(phase: Phase, total: Option<u64>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            phase,
            total,
            start: Instant::now(),
            last_shown: None,
            reporter,
        }
    }

    /// Record `done` units. Emits an event only when the displayed value
    /// increases; a lower count (e.g. a retried chunk) never moves it back.
    pub fn update(&mut self, done: u64) {
        let shown = match self.total {
            Some(total) if total > 0 => {
                Shown::Percent((done.min(total) as u128 * 100 / total as u128) as u8)
            }
            Some(_) => Shown::Percent(100),
            None => Shown::Mebibytes(done / MIB),
        };
        if let Some(last) = self.last_shown {
            if shown <= last {
                return;
            }
        }
        self.last_shown = Some(shown);
        self.emit(done);
    }

    /// Emit a final event for a completed phase (100% when the total is known).
    pub fn finish(&mut self, done: u64) {
        if self.total.is_none() {
            // Mebibyte counts and percentages are not comparable.
            self.total = Some(done);
            self.last_shown = None;
        }
        self.update(done);
    }

    fn emit(&self, done: u64) {
        let elapsed = self.start.elapsed();
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { done as f64 / secs } else { 0.0 };
        let event = ProgressEvent {
            phase: self.phase,
            bytes_done: done,
            bytes_total: self.total,
            elapsed,
            rate,
        };
        if let Err(e) = self.reporter.notify(&event) {
            tracing::warn!(phase = %self.phase, error = %e, "progress reporter failed; ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn notify(&self, event: &ProgressEvent) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn percents(r: &Recorder) -> Vec<u8> {
        r.0.lock().unwrap().iter().filter_map(|e| e.percent()).collect()
    }

    #[test]
    fn emits_only_when_percent_changes() {
        let rec = Arc::new(Recorder::default());
        let mut t = ProgressTracker::new(Phase::Downloading, Some(1000), rec.clone());
        t.update(0);
        t.update(1);
        t.update(5);
        t.update(10);
        t.update(15);
        t.update(500);
        assert_eq!(percents(&rec), vec![0, 1, 50]);
    }

    #[test]
    fn percent_never_decreases() {
        let rec = Arc::new(Recorder::default());
        let mut t = ProgressTracker::new(Phase::Uploading, Some(100), rec.clone());
        t.update(40);
        t.update(20);
        t.update(40);
        t.update(60);
        assert_eq!(percents(&rec), vec![40, 60]);
    }

    #[test]
    fn unknown_total_reports_whole_mebibytes() {
        let rec = Arc::new(Recorder::default());
        let mut t = ProgressTracker::new(Phase::Downloading, None, rec.clone());
        t.update(10);
        t.update(MIB - 1);
        t.update(MIB);
        t.update(MIB + 5);
        t.update(3 * MIB);
        let events = rec.0.lock().unwrap();
        let done: Vec<u64> = events.iter().map(|e| e.bytes_done).collect();
        assert_eq!(done, vec![10, MIB, 3 * MIB]);
        assert!(events.iter().all(|e| e.bytes_total.is_none()));
    }

    #[test]
    fn finish_reports_completion() {
        let rec = Arc::new(Recorder::default());
        let mut t = ProgressTracker::new(Phase::Downloading, None, rec.clone());
        t.finish(2048);
        let events = rec.0.lock().unwrap();
        assert_eq!(events.last().unwrap().percent(), Some(100));
    }

    #[test]
    fn finish_after_unknown_total_progress_reports_completion() {
        let rec = Arc::new(Recorder::default());
        let mut t = ProgressTracker::new(Phase::Downloading, None, rec.clone());
        t.update(0);
        t.update(3 * MIB);
        t.finish(3 * MIB + 17);
        let events = rec.0.lock().unwrap();
        assert_eq!(events.len(), 3);
        let last = events.last().unwrap();
        assert_eq!(last.percent(), Some(100));
        assert_eq!(last.bytes_done, 3 * MIB + 17);
    }

    #[test]
    fn reporter_failure_is_swallowed() {
        let failing = |_: &ProgressEvent| -> anyhow::Result<()> { anyhow::bail!("chat API down") };
        let mut t = ProgressTracker::new(Phase::Compositing, Some(10), Arc::new(failing));
        t.update(5);
        t.finish(10);
    }

    #[test]
    fn eta_from_rate() {
        let e = ProgressEvent {
            phase: Phase::Downloading,
            bytes_done: 50,
            bytes_total: Some(150),
            elapsed: Duration::from_secs(5),
            rate: 10.0,
        };
        assert_eq!(e.percent(), Some(33));
        assert_eq!(e.eta(), Some(Duration::from_secs(10)));
    }
}
