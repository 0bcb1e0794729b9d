//! `reel checksum`: SHA-256 of a file, in `sha256sum` format.

use anyhow::Result;
use reel_core::checksum;
use std::path::Path;

pub async fn run_checksum(path: &Path) -> Result<()> {
    let p = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || checksum::digest_file(&p)).await??;
    println!("{}  {}", digest.sha256, path.display());
    Ok(())
}
