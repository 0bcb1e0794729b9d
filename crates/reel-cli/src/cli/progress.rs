//! Progress lines on stderr.

use anyhow::Result;
use reel_core::progress::{Phase, ProgressEvent, ProgressReporter};
use std::io::Write;

/// Prints one line per progress event, optionally prefixed with a job label.
pub struct ConsoleReporter {
    label: Option<String>,
}

impl ConsoleReporter {
    pub fn new(label: Option<String>) -> Self {
        Self { label }
    }
}

pub(crate) fn format_event(event: &ProgressEvent) -> String {
    let (done, rate) = match event.phase {
        Phase::Compositing => (
            format!("{} frames", event.bytes_done),
            format!("{:.1} fps", event.rate),
        ),
        _ => (
            format!("{:.1} MiB", event.bytes_done as f64 / 1_048_576.0),
            format!("{:.2} MiB/s", event.rate / 1_048_576.0),
        ),
    };
    let eta = event
        .eta()
        .map(|d| format!("ETA {}s", d.as_secs()))
        .unwrap_or_else(|| "ETA ?".to_string());
    match event.percent() {
        Some(pct) => format!("{:<12} {:>3}%  {}  {}  {}", event.phase, pct, done, rate, eta),
        None => format!("{:<12} {}  {}", event.phase, done, rate),
    }
}

impl ProgressReporter for ConsoleReporter {
    fn notify(&self, event: &ProgressEvent) -> Result<()> {
        let line = format_event(event);
        let mut err = std::io::stderr().lock();
        match &self.label {
            Some(label) => writeln!(err, "[{}] {}", label, line)?,
            None => writeln!(err, "{}", line)?,
        }
        Ok(())
    }
}
