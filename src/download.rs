//! Resumable download of dump files. Transfers retry with exponential
//! backoff and continue from the last received byte via HTTP `Range`; a 416
//! response means the file is already complete. `file://` URLs are served by
//! a local copy so the pipeline can run against pre-fetched dumps.

use crate::config::{
    DumpConfig, DOWNLOAD_BACKOFF_BASE_SECS, DOWNLOAD_BACKOFF_CAP_SECS, DOWNLOAD_LOG_EVERY_BYTES,
};
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

pub fn client(cfg: &DumpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(cfg.connect_timeout)
        .read_timeout(cfg.read_timeout)
        .build()
        .context("failed to build HTTP client")
}

/// Downloads `url` to `dest`, retrying interrupted transfers.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    cfg: &DumpConfig,
) -> Result<()> {
    if let Some(local) = url.strip_prefix("file://") {
        tokio::fs::copy(local, dest)
            .await
            .with_context(|| format!("failed to copy local dump: {local}"))?;
        return Ok(());
    }

    info!(url, "downloading");
    let mut downloaded: u64 = 0;
    let mut total_size: Option<u64> = None;
    let mut last_logged: u64 = 0;

    for attempt in 1..=cfg.download_max_retries {
        match stream_once(
            client,
            url,
            dest,
            &mut downloaded,
            &mut total_size,
            &mut last_logged,
        )
        .await
        {
            Ok(()) => {
                info!(url, mb = downloaded / (1024 * 1024), "download complete");
                return Ok(());
            }
            Err(e) => {
                if attempt == cfg.download_max_retries {
                    return Err(e).with_context(|| {
                        format!(
                            "download failed after {} attempts: {url}",
                            cfg.download_max_retries
                        )
                    });
                }
                let wait = (DOWNLOAD_BACKOFF_BASE_SECS * 2u64.pow(attempt - 1))
                    .min(DOWNLOAD_BACKOFF_CAP_SECS);
                warn!(
                    error = %e,
                    attempt,
                    wait_secs = wait,
                    mb = downloaded / (1024 * 1024),
                    "download interrupted, retrying"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
            }
        }
    }
    bail!("download retries exhausted: {url}")
}

async fn stream_once(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    downloaded: &mut u64,
    total_size: &mut Option<u64>,
    last_logged: &mut u64,
) -> Result<()> {
    let mut request = client.get(url);
    let mut file = if *downloaded > 0 {
        request = request.header(reqwest::header::RANGE, format!("bytes={downloaded}-"));
        info!(mb = *downloaded / (1024 * 1024), "resuming download");
        OpenOptions::new().append(true).open(dest).await?
    } else {
        File::create(dest).await?
    };

    let response = request.send().await?;
    if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        info!("download already complete (416 response)");
        return Ok(());
    }
    let response = response.error_for_status()?;

    if total_size.is_none() {
        *total_size = response.content_length().map(|len| len + *downloaded);
    }

    let pb = match *total_size {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("    {spinner:.cyan} [{bar:30.cyan/blue}] {bytes}/{total_bytes}")
                    .unwrap()
                    .progress_chars("=> "),
            );
            pb.set_position(*downloaded);
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        *downloaded += chunk.len() as u64;
        pb.set_position(*downloaded);

        if *downloaded - *last_logged >= DOWNLOAD_LOG_EVERY_BYTES {
            *last_logged = *downloaded;
            match *total_size {
                Some(total) if total > 0 => info!(
                    mb = *downloaded / (1024 * 1024),
                    total_mb = total / (1024 * 1024),
                    pct = format!("{:.1}", *downloaded as f64 / total as f64 * 100.0),
                    "download progress"
                ),
                _ => info!(mb = *downloaded / (1024 * 1024), "download progress"),
            }
        }
    }

    file.flush().await?;
    pb.finish_and_clear();
    Ok(())
}
