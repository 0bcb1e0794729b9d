//! `reel completions` and `reel manpage`.

use anyhow::Result;
use clap::CommandFactory;
use std::io::Write;

use crate::cli::Cli;

pub fn write_completions(shell: clap_complete::Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "reel", out);
}

pub fn render_manpage(out: &mut dyn Write) -> Result<()> {
    clap_mangen::Man::new(Cli::command()).render(out)?;
    Ok(())
}
