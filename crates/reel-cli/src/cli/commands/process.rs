//! `reel process`: one video through the whole pipeline.

use anyhow::{bail, Result};
use reel_core::config::ReelConfig;
use reel_core::delivery::{Delivery, DirectoryDelivery, HttpPutDelivery};
use reel_core::job::{JobContext, JobRunner, JobSettings, JobSpec, JobState};
use std::sync::Arc;

use crate::cli::progress::ConsoleReporter;
use crate::cli::DeliveryTarget;

use super::cancel_on_ctrl_c;

pub(crate) fn ensure_tools(ctx: &JobContext) -> Result<()> {
    let missing = ctx.tools.missing();
    if !missing.is_empty() {
        bail!("required tools not found: {}", missing.join(", "));
    }
    Ok(())
}

pub async fn run_process(
    cfg: ReelConfig,
    url: &str,
    settings: JobSettings,
    size_hint: Option<u64>,
    target: &DeliveryTarget,
) -> Result<()> {
    let delivery: Arc<dyn Delivery> = match (&target.out_dir, &target.upload_to) {
        (_, Some(dest)) => Arc::new(HttpPutDelivery::new(dest.clone(), &cfg.transfer)),
        (Some(dir), None) => Arc::new(DirectoryDelivery::new(dir.clone())),
        (None, None) => bail!("one of --out-dir or --upload-to is required"),
    };
    let ctx = JobContext::new(cfg);
    ensure_tools(&ctx)?;

    let runner = Arc::new(JobRunner::new(ctx));
    let interrupt = cancel_on_ctrl_c(&runner);
    let spec = JobSpec::new(1, url, settings, delivery)
        .with_size_hint(size_hint)
        .with_reporter(Arc::new(ConsoleReporter::new(None)));
    let outcome = runner.run(spec).await;
    interrupt.abort();

    match outcome.state {
        JobState::Completed => {
            if let Some(ack) = outcome.ack {
                println!("{}", ack.location);
                println!("{} bytes  sha256 {}", ack.bytes, ack.sha256);
            }
            Ok(())
        }
        JobState::Cancelled => bail!("cancelled"),
        JobState::Failed(reason) => bail!(reason),
        other => bail!("job ended in unexpected state {}", other),
    }
}
