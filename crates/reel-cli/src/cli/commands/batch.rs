//! `reel batch`: many videos under the configured job cap.

use anyhow::{bail, Context, Result};
use reel_core::config::ReelConfig;
use reel_core::delivery::{Delivery, DirectoryDelivery};
use reel_core::job::{JobContext, JobRunner, JobSpec, JobState};
use std::path::Path;
use std::sync::Arc;

use crate::cli::progress::ConsoleReporter;
use crate::cli::OverlayArgs;

use super::cancel_on_ctrl_c;
use super::process::ensure_tools;

/// One `(url, title)` pair per non-blank, non-comment line, separated by a tab.
pub fn parse_batch(text: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let Some((url, title)) = line.split_once('\t') else {
            bail!("line {}: expected URL<TAB>TITLE", n + 1);
        };
        let (url, title) = (url.trim(), title.trim());
        if url.is_empty() {
            bail!("line {}: empty URL", n + 1);
        }
        entries.push((url.to_string(), title.to_string()));
    }
    Ok(entries)
}

pub async fn run_batch(
    cfg: ReelConfig,
    file: &Path,
    overlay: &OverlayArgs,
    out_dir: &Path,
) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let entries = parse_batch(&text)?;
    if entries.is_empty() {
        println!("nothing to do");
        return Ok(());
    }

    let delivery: Arc<dyn Delivery> = Arc::new(DirectoryDelivery::new(out_dir));
    let specs: Vec<JobSpec> = entries
        .iter()
        .enumerate()
        .map(|(i, (url, title))| {
            let id = i as u64 + 1;
            JobSpec::new(id, url.as_str(), overlay.settings(title, &cfg), Arc::clone(&delivery))
                .with_reporter(Arc::new(ConsoleReporter::new(Some(format!("job {}", id)))))
        })
        .collect();
    let ctx = JobContext::new(cfg);
    ensure_tools(&ctx)?;

    let runner = Arc::new(JobRunner::new(ctx));
    let interrupt = cancel_on_ctrl_c(&runner);
    let outcomes = runner.run_all(specs).await;
    interrupt.abort();

    let mut failed = 0usize;
    for o in &outcomes {
        match (&o.state, &o.ack) {
            (JobState::Completed, Some(ack)) => println!("job {}: {}", o.id, ack.location),
            (state, _) => {
                failed += 1;
                println!("job {}: {}", o.id, state);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} job(s) did not complete", failed, outcomes.len());
    }
    Ok(())
}
