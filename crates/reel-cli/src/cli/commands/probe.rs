//! `reel probe`: what the server reports for a URL.

use anyhow::{Context, Result};
use reel_core::probe;

pub async fn run_probe(url: &str) -> Result<()> {
    let target = url.to_string();
    let result = tokio::task::spawn_blocking(move || probe::probe(&target))
        .await?
        .with_context(|| format!("probe {}", url))?;

    match result.total_size {
        Some(n) => println!("size:          {} bytes ({:.1} MiB)", n, n as f64 / 1_048_576.0),
        None => println!("size:          unknown"),
    }
    println!("ranges:        {}", if result.supports_ranges { "yes" } else { "no" });
    println!(
        "download mode: {}",
        if result.allows_parallel() { "parallel chunks" } else { "single stream" }
    );
    if let Some(ct) = &result.content_type {
        println!("content-type:  {}", ct);
    }
    if let Some(cd) = &result.content_disposition {
        println!("disposition:   {}", cd);
    }
    Ok(())
}
