//! Phase 6: reading-log aggregation. Mirrors the ratings phase over the
//! `(work_key, user, shelf)` TSV dump, counting the three Open Library
//! shelves per work and applying the counters to every mapped language row.

use crate::config::AGGREGATE_CHUNK_SIZE;
use crate::lookup::BookMap;
use crate::models::{ReadingLogReport, ShelfCounts};
use crate::store::CatalogStore;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

pub async fn run(
    path: &Path,
    store: &mut CatalogStore,
    book_map: &BookMap,
) -> Result<ReadingLogReport> {
    let path = path.to_path_buf();
    let aggregates = tokio::task::spawn_blocking(move || aggregate(&path))
        .await
        .context("reading-log aggregation task failed")??;
    info!(works = aggregates.len(), "reading-log dump aggregated");

    let mut report = ReadingLogReport {
        works: aggregates.len() as u64,
        rows_updated: 0,
    };

    let mut updates: Vec<(i64, ShelfCounts)> = Vec::with_capacity(AGGREGATE_CHUNK_SIZE);
    for (work_ol_id, counts) in &aggregates {
        let Some(rows) = book_map.rows(work_ol_id) else {
            continue;
        };
        for row in rows {
            updates.push((row.book_id, *counts));
            if updates.len() >= AGGREGATE_CHUNK_SIZE {
                flush(store, &mut updates, &mut report)?;
            }
        }
    }
    flush(store, &mut updates, &mut report)?;

    info!(
        works = report.works,
        rows_updated = report.rows_updated,
        "reading-log phase complete"
    );
    Ok(report)
}

fn flush(
    store: &mut CatalogStore,
    updates: &mut Vec<(i64, ShelfCounts)>,
    report: &mut ReadingLogReport,
) -> Result<()> {
    if updates.is_empty() {
        return Ok(());
    }
    store.begin()?;
    report.rows_updated += store.apply_reading_log(updates)?;
    store.commit()?;
    updates.clear();
    Ok(())
}

fn aggregate(path: &Path) -> Result<FxHashMap<String, ShelfCounts>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open reading-log dump: {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(BufReader::new(GzDecoder::new(file)));

    let mut aggregates: FxHashMap<String, ShelfCounts> = FxHashMap::default();
    for record in reader.records() {
        let Ok(record) = record else { continue };
        if record.len() < 3 {
            continue;
        }
        let work = record[0].trim();
        let work = work.strip_prefix("/works/").unwrap_or(work);
        if work.is_empty() {
            continue;
        }
        let shelf = record[2].trim();

        // a work seen with an unknown shelf still gets a zeroed entry
        let entry = aggregates.entry(work.to_string()).or_default();
        match shelf {
            "Want to Read" => entry.want += 1,
            "Currently Reading" => entry.reading += 1,
            "Already Read" => entry.read += 1,
            _ => {}
        }
    }
    Ok(aggregates)
}
