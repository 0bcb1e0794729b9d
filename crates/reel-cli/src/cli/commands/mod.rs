//! CLI command handlers, one per file.

mod batch;
mod checksum;
mod docs;
mod probe;
mod process;

pub use batch::{parse_batch, run_batch};
pub use checksum::run_checksum;
pub use docs::{render_manpage, write_completions};
pub use probe::run_probe;
pub use process::run_process;

use std::sync::Arc;

use reel_core::job::JobRunner;

/// Cancel every job of `runner` on Ctrl-C. The returned handle is aborted by the caller.
pub(super) fn cancel_on_ctrl_c(runner: &Arc<JobRunner>) -> tokio::task::JoinHandle<()> {
    let runner = Arc::clone(runner);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt: cancelling jobs...");
            tracing::info!("ctrl-c received, cancelling all jobs");
            runner.cancel_all();
        }
    })
}
