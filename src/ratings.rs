//! Phase 5: ratings aggregation. One full blocking pass over the 3-column
//! `(work_key, user, rating)` TSV dump builds per-work count/sum aggregates
//! in memory; no batching channel is involved. Every language row mapped to
//! a work receives the same count and 2-decimal average, flushed in
//! committed chunks.

use crate::config::AGGREGATE_CHUNK_SIZE;
use crate::lookup::BookMap;
use crate::models::{RatingAggregate, RatingsReport};
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
) -> Result<RatingsReport> {
    let path = path.to_path_buf();
    let aggregates = tokio::task::spawn_blocking(move || aggregate(&path))
        .await
        .context("ratings aggregation task failed")??;
    info!(works = aggregates.len(), "ratings dump aggregated");

    let mut report = RatingsReport {
        works: aggregates.len() as u64,
        rows_updated: 0,
    };

    let mut updates: Vec<(i64, u64, f64)> = Vec::with_capacity(AGGREGATE_CHUNK_SIZE);
    for (work_ol_id, agg) in &aggregates {
        let Some(rows) = book_map.rows(work_ol_id) else {
            continue;
        };
        let average = agg.average();
        for row in rows {
            updates.push((row.book_id, agg.count, average));
            if updates.len() >= AGGREGATE_CHUNK_SIZE {
                flush(store, &mut updates, &mut report)?;
            }
        }
    }
    flush(store, &mut updates, &mut report)?;

    info!(
        works = report.works,
        rows_updated = report.rows_updated,
        "ratings phase complete"
    );
    Ok(report)
}

fn flush(
    store: &mut CatalogStore,
    updates: &mut Vec<(i64, u64, f64)>,
    report: &mut RatingsReport,
) -> Result<()> {
    if updates.is_empty() {
        return Ok(());
    }
    store.begin()?;
    report.rows_updated += store.apply_ratings(updates)?;
    store.commit()?;
    updates.clear();
    Ok(())
}

fn aggregate(path: &Path) -> Result<FxHashMap<String, RatingAggregate>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open ratings dump: {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(BufReader::new(GzDecoder::new(file)));

    let mut aggregates: FxHashMap<String, RatingAggregate> = FxHashMap::default();
    for record in reader.records() {
        // malformed rows are skipped, never fatal
        let Ok(record) = record else { continue };
        if record.len() < 3 {
            continue;
        }
        let work = record[0].trim();
        let work = work.strip_prefix("/works/").unwrap_or(work);
        if work.is_empty() {
            continue;
        }
        let Ok(value) = record[2].trim().parse::<i64>() else {
            continue;
        };
        if !(1..=5).contains(&value) {
            continue;
        }
        let entry = aggregates.entry(work.to_string()).or_default();
        entry.count += 1;
        entry.total += value as u64;
    }
    Ok(aggregates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_gz(dir: &TempDir, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join("ratings.txt.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::fast());
        for line in lines {
            writeln!(encoder, "{line}").unwrap();
        }
        encoder.finish().unwrap();
        path
    }

    #[test]
    fn aggregates_count_and_sum_per_work() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(
            &dir,
            &[
                "/works/OL1W\tu1\t4",
                "/works/OL1W\tu2\t5",
                "/works/OL1W\tu3\t3",
                "/works/OL2W\tu1\t2",
            ],
        );
        let aggregates = aggregate(&path).unwrap();
        let ol1 = &aggregates["OL1W"];
        assert_eq!(ol1.count, 3);
        assert_eq!(ol1.total, 12);
        assert_eq!(ol1.average(), 4.0);
        assert_eq!(aggregates["OL2W"].count, 1);
    }

    #[test]
    fn rejects_out_of_range_and_malformed_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(
            &dir,
            &[
                "/works/OL1W\tu1\t6",
                "/works/OL1W\tu2\t0",
                "/works/OL1W\tu3\tnot-a-number",
                "/works/OL1W\tu4",
                "/works/OL1W\tu5\t5",
            ],
        );
        let aggregates = aggregate(&path).unwrap();
        let ol1 = &aggregates["OL1W"];
        assert_eq!(ol1.count, 1);
        assert_eq!(ol1.total, 5);
    }

    #[test]
    fn fractional_average_rounds_to_two_places() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, &["/works/OL1W\tu1\t4", "/works/OL1W\tu2\t5"]);
        let aggregates = aggregate(&path).unwrap();
        assert_eq!(aggregates["OL1W"].average(), 4.5);
    }
}
