//! Streaming dump reader: a dedicated OS thread gunzips and decodes dump
//! lines into record batches, pushing them to the async consumer through a
//! bounded channel. The channel is the only synchronization point; when it is
//! full the decode thread blocks, which is the backpressure mechanism. The
//! channel closing is the completion signal. The sequence of batches is lazy,
//! finite, and non-restartable.

use crate::config::CHANNEL_CAPACITY;
use crate::models::DumpRecord;
use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 128 * 1024;

/// How a dump line maps to a record.
#[derive(Debug, Clone)]
pub enum LineFormat {
    /// 5-column `(type, key, revision, timestamp, JSON)` rows, kept only when
    /// the first column equals `tag`
    TypeTagged { tag: String },
    /// 2-column `(key, JSON)` rows
    KeyedJson,
}

/// Counters shared between the decode thread and the consumer.
#[derive(Default)]
pub struct ReaderStats {
    lines_scanned: AtomicU64,
    records_decoded: AtomicU64,
    skipped_malformed: AtomicU64,
    filtered_out: AtomicU64,
}

impl ReaderStats {
    fn inc_lines(&self) {
        self.lines_scanned.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_decoded(&self) {
        self.records_decoded.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_malformed(&self) {
        self.skipped_malformed.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_filtered(&self) {
        self.filtered_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lines_scanned(&self) -> u64 {
        self.lines_scanned.load(Ordering::Relaxed)
    }

    pub fn records_decoded(&self) -> u64 {
        self.records_decoded.load(Ordering::Relaxed)
    }

    pub fn skipped_malformed(&self) -> u64 {
        self.skipped_malformed.load(Ordering::Relaxed)
    }

    pub fn filtered_out(&self) -> u64 {
        self.filtered_out.load(Ordering::Relaxed)
    }
}

pub struct DumpReader {
    rx: mpsc::Receiver<Vec<DumpRecord>>,
    worker: Option<JoinHandle<Result<()>>>,
    stats: Arc<ReaderStats>,
}

impl DumpReader {
    /// Starts the decode thread over a gzip dump file.
    pub fn spawn(path: impl AsRef<Path>, format: LineFormat, batch_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let path: PathBuf = path.as_ref().to_path_buf();
        let stats = Arc::new(ReaderStats::default());
        let worker_stats = Arc::clone(&stats);
        let worker =
            std::thread::spawn(move || decode_loop(&path, &format, batch_size, tx, &worker_stats));
        Self {
            rx,
            worker: Some(worker),
            stats,
        }
    }

    /// Next batch of decoded records; `None` once the dump is exhausted.
    pub async fn next_batch(&mut self) -> Option<Vec<DumpRecord>> {
        self.rx.recv().await
    }

    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    /// Joins the decode thread and surfaces any I/O error it hit. Call after
    /// draining the batches; an early call stops the decode thread at its
    /// next send.
    pub fn finish(mut self) -> Result<()> {
        self.rx.close();
        match self.worker.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => bail!("dump decode thread panicked"),
            },
            None => Ok(()),
        }
    }
}

fn decode_loop(
    path: &Path,
    format: &LineFormat,
    batch_size: usize,
    tx: mpsc::Sender<Vec<DumpRecord>>,
    stats: &ReaderStats,
) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("failed to open dump file: {}", path.display()))?;
    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, GzDecoder::new(file));

    let mut batch = Vec::with_capacity(batch_size);
    for line in reader.lines() {
        let line =
            line.with_context(|| format!("failed reading dump stream: {}", path.display()))?;
        stats.inc_lines();

        let Some(record) = decode_line(&line, format, stats) else {
            continue;
        };
        stats.inc_decoded();
        batch.push(record);

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.blocking_send(full).is_err() {
                debug!("consumer dropped, stopping decode");
                return Ok(());
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.blocking_send(batch);
    }
    // dropping the sender closes the channel, signalling completion
    Ok(())
}

/// Best-effort line decode. Wrong column counts and bad JSON are counted and
/// skipped, never fatal.
fn decode_line(line: &str, format: &LineFormat, stats: &ReaderStats) -> Option<DumpRecord> {
    match format {
        LineFormat::TypeTagged { tag } => {
            // cheap type check on the first column before the full split
            let Some(first_tab) = memchr::memchr(b'\t', line.as_bytes()) else {
                stats.inc_malformed();
                return None;
            };
            if &line[..first_tab] != tag.as_str() {
                stats.inc_filtered();
                return None;
            }

            let mut columns = line.splitn(5, '\t');
            let _record_type = columns.next();
            let key = columns.next();
            let _revision = columns.next();
            let _timestamp = columns.next();
            let json = columns.next();
            let (Some(key), Some(json)) = (key, json) else {
                stats.inc_malformed();
                return None;
            };

            match serde_json::from_str(json) {
                Ok(data) => Some(DumpRecord {
                    key: key.to_string(),
                    data,
                }),
                Err(_) => {
                    stats.inc_malformed();
                    None
                }
            }
        }
        LineFormat::KeyedJson => {
            let Some(tab) = memchr::memchr(b'\t', line.as_bytes()) else {
                stats.inc_malformed();
                return None;
            };
            let key = &line[..tab];
            let json = &line[tab + 1..];
            if key.is_empty() {
                stats.inc_malformed();
                return None;
            }
            match serde_json::from_str(json) {
                Ok(data) => Some(DumpRecord {
                    key: key.to_string(),
                    data,
                }),
                Err(_) => {
                    stats.inc_malformed();
                    None
                }
            }
        }
    }
}
