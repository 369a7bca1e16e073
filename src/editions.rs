//! Phase 4: edition reconciliation. Scans `/type/edition` records and keeps,
//! per (work, language), the single best-scoring edition seen so far -- a
//! fold into a map of running candidates, so the edition dump is never held
//! in memory. ISBNs accumulate as a union across every edition of the pair,
//! whichever edition wins. After the scan, candidates merge into existing
//! rows or clone the work's English row into a new language variant.

use crate::config::{DumpConfig, MAX_PUBLISHER_LEN, UPDATE_CHUNK_SIZE};
use crate::fields;
use crate::lookup::BookMap;
use crate::models::{EditionCandidate, EditionsReport, Series};
use crate::normalize;
use crate::reader::{DumpReader, LineFormat};
use crate::store::CatalogStore;
use anyhow::Result;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

pub async fn run(
    path: &Path,
    store: &mut CatalogStore,
    book_map: &mut BookMap,
    cfg: &DumpConfig,
) -> Result<EditionsReport> {
    let mut reader = DumpReader::spawn(
        path,
        LineFormat::TypeTagged {
            tag: "/type/edition".to_string(),
        },
        cfg.edition_batch_size,
    );

    let mut report = EditionsReport::default();
    let mut best: FxHashMap<(String, String), EditionCandidate> = FxHashMap::default();

    while let Some(batch) = reader.next_batch().await {
        for record in &batch {
            report.scanned += 1;

            let Some(work_ol_id) = record
                .data
                .get("works")
                .and_then(Value::as_array)
                .and_then(|works| works.first())
                .and_then(|first| fields::key_suffix(first, "/works/"))
            else {
                report.skipped += 1;
                continue;
            };
            if !book_map.contains(work_ol_id) {
                report.skipped += 1;
                continue;
            }

            let language = record
                .data
                .get("languages")
                .and_then(Value::as_array)
                .and_then(|langs| langs.first())
                .and_then(fields::language_code)
                .unwrap_or("en");

            let candidate = build_candidate(&record.data, work_ol_id, language);
            fold_candidate(&mut best, candidate);
        }
    }
    reader.finish()?;

    info!(
        scanned = report.scanned,
        candidates = best.len(),
        skipped = report.skipped,
        "edition scan complete"
    );

    flush_candidates(store, book_map, best, &mut report)?;

    info!(
        scanned = report.scanned,
        enriched = report.enriched,
        new_language_rows = report.new_language_rows,
        skipped = report.skipped,
        "edition phase complete"
    );
    Ok(report)
}

/// Score 0-6: one point per populated field among isbn, page count,
/// publishers, covers, description, physical format.
fn score_edition(data: &Value) -> u8 {
    let mut score = 0;
    let has_list = |key: &str| {
        data.get(key)
            .and_then(Value::as_array)
            .is_some_and(|list| !list.is_empty())
    };
    if has_list("isbn_10") || has_list("isbn_13") {
        score += 1;
    }
    if data.get("number_of_pages").and_then(Value::as_i64).is_some_and(|n| n > 0) {
        score += 1;
    }
    if has_list("publishers") {
        score += 1;
    }
    if has_list("covers") {
        score += 1;
    }
    if data
        .get("description")
        .is_some_and(|d| fields::text_value(d).is_some_and(|s| !s.is_empty()))
    {
        score += 1;
    }
    if data
        .get("physical_format")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
    {
        score += 1;
    }
    score
}

fn build_candidate(data: &Value, work_ol_id: &str, language: &str) -> EditionCandidate {
    let publisher = data
        .get("publishers")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .map(|p| normalize::truncate_chars(p, MAX_PUBLISHER_LEN).to_string());

    let physical_format = data
        .get("physical_format")
        .and_then(Value::as_str)
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty());

    let series = data
        .get("series")
        .and_then(Value::as_array)
        .and_then(|list| first_series(list));

    EditionCandidate {
        work_ol_id: work_ol_id.to_string(),
        language: language.to_string(),
        isbns: fields::isbns(data),
        page_count: data.get("number_of_pages").and_then(fields::positive_int),
        publisher,
        physical_format,
        external_ids: fields::identifiers(data),
        cover_url: data.get("covers").and_then(fields::cover_url),
        description: data.get("description").and_then(fields::description),
        series,
        score: score_edition(data),
    }
}

fn first_series(list: &[Value]) -> Option<Series> {
    list.iter()
        .filter_map(Value::as_str)
        .find_map(normalize::parse_series)
}

/// Replace-in-place reduction: a strictly higher score takes over the slot
/// (ties keep the earlier edition); the ISBN union survives either way.
fn fold_candidate(
    best: &mut FxHashMap<(String, String), EditionCandidate>,
    mut candidate: EditionCandidate,
) {
    let key = (candidate.work_ol_id.clone(), candidate.language.clone());
    match best.get_mut(&key) {
        None => {
            best.insert(key, candidate);
        }
        Some(existing) => {
            let mut union = std::mem::take(&mut existing.isbns);
            for isbn in candidate.isbns.drain(..) {
                if !union.contains(&isbn) {
                    union.push(isbn);
                }
            }
            if candidate.score > existing.score {
                candidate.isbns = union;
                *existing = candidate;
            } else {
                existing.isbns = union;
            }
        }
    }
}

fn flush_candidates(
    store: &mut CatalogStore,
    book_map: &mut BookMap,
    best: FxHashMap<(String, String), EditionCandidate>,
    report: &mut EditionsReport,
) -> Result<()> {
    store.begin()?;
    let mut pending = 0usize;

    for (_, candidate) in best {
        let (matching, english_source) = {
            let Some(rows) = book_map.rows(&candidate.work_ol_id) else {
                continue;
            };
            let mut matching = None;
            let mut english = None;
            for row in rows {
                if row.language == candidate.language {
                    matching = Some(row.book_id);
                    break;
                }
                if row.language == "en" {
                    english = Some(row.book_id);
                }
            }
            (matching, english)
        };

        if let Some(book_id) = matching {
            match store.enrich_book(book_id, &candidate) {
                Ok(()) => report.enriched += 1,
                Err(e) => debug!(error = %e, work = %candidate.work_ol_id, "edition merge failed"),
            }
        } else if candidate.language != "en" {
            if let Some(source_id) = english_source {
                match store.clone_language_row(source_id, &candidate) {
                    Ok(Some(row)) => {
                        book_map.append(&candidate.work_ol_id, row);
                        report.new_language_rows += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(error = %e, work = %candidate.work_ol_id, "language clone failed")
                    }
                }
            }
            // no English source row: the candidate is dropped
        }

        pending += 1;
        if pending >= UPDATE_CHUNK_SIZE {
            store.commit()?;
            store.begin()?;
            pending = 0;
        }
    }

    store.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn score_empty_edition_is_zero() {
        assert_eq!(score_edition(&json!({})), 0);
    }

    #[test]
    fn score_full_edition_is_six() {
        let edition = json!({
            "isbn_13": ["9780441569595"],
            "number_of_pages": 271,
            "publishers": ["Ace Books"],
            "covers": [12345],
            "description": "A cyberpunk novel",
            "physical_format": "Hardcover"
        });
        assert_eq!(score_edition(&edition), 6);
    }

    #[test]
    fn score_partial_edition() {
        let edition = json!({"isbn_10": ["0441569595"], "publishers": ["Ace Books"]});
        assert_eq!(score_edition(&edition), 2);
    }

    #[test]
    fn score_ignores_non_positive_page_counts() {
        assert_eq!(score_edition(&json!({"number_of_pages": 0})), 0);
        assert_eq!(score_edition(&json!({"number_of_pages": -1})), 0);
    }

    fn candidate(work: &str, lang: &str, score: u8, isbns: &[&str]) -> EditionCandidate {
        EditionCandidate {
            work_ol_id: work.to_string(),
            language: lang.to_string(),
            isbns: isbns.iter().map(|s| s.to_string()).collect(),
            page_count: Some(score as i64),
            publisher: None,
            physical_format: None,
            external_ids: Default::default(),
            cover_url: None,
            description: None,
            series: None,
            score,
        }
    }

    #[test]
    fn fold_keeps_highest_score_and_unions_isbns() {
        let mut best = FxHashMap::default();
        fold_candidate(&mut best, candidate("OL1W", "en", 2, &["isbn-a"]));
        fold_candidate(&mut best, candidate("OL1W", "en", 6, &["isbn-b"]));

        let winner = &best[&("OL1W".to_string(), "en".to_string())];
        assert_eq!(winner.score, 6);
        // canonical fields come from the winner
        assert_eq!(winner.page_count, Some(6));
        // but the ISBN list is the union across both editions
        assert_eq!(winner.isbns, vec!["isbn-a", "isbn-b"]);
    }

    #[test]
    fn fold_tie_keeps_earlier_edition() {
        let mut best = FxHashMap::default();
        let mut first = candidate("OL1W", "en", 3, &["isbn-a"]);
        first.publisher = Some("First".to_string());
        let mut second = candidate("OL1W", "en", 3, &["isbn-b"]);
        second.publisher = Some("Second".to_string());

        fold_candidate(&mut best, first);
        fold_candidate(&mut best, second);

        let winner = &best[&("OL1W".to_string(), "en".to_string())];
        assert_eq!(winner.publisher.as_deref(), Some("First"));
        assert_eq!(winner.isbns, vec!["isbn-a", "isbn-b"]);
    }

    #[test]
    fn fold_union_deduplicates() {
        let mut best = FxHashMap::default();
        fold_candidate(&mut best, candidate("OL1W", "en", 2, &["same"]));
        fold_candidate(&mut best, candidate("OL1W", "en", 1, &["same", "new"]));
        let winner = &best[&("OL1W".to_string(), "en".to_string())];
        assert_eq!(winner.isbns, vec!["same", "new"]);
    }

    #[test]
    fn fold_tracks_language_pairs_independently() {
        let mut best = FxHashMap::default();
        fold_candidate(&mut best, candidate("OL1W", "en", 2, &["a"]));
        fold_candidate(&mut best, candidate("OL1W", "fr", 5, &["b"]));
        assert_eq!(best.len(), 2);
    }

    #[test]
    fn build_candidate_extracts_edition_fields() {
        let data = json!({
            "isbn_10": ["0441013597"],
            "isbn_13": ["9780441013593"],
            "number_of_pages": 412,
            "publishers": ["Ace Books", "Ignored Second"],
            "physical_format": "  Paperback ",
            "covers": [99],
            "description": {"type": "/type/text", "value": "An edition"},
            "identifiers": {"goodreads": ["123"]},
            "series": ["Dune #1"]
        });
        let c = build_candidate(&data, "OL1W", "en");
        assert_eq!(c.isbns, vec!["0441013597", "9780441013593"]);
        assert_eq!(c.page_count, Some(412));
        assert_eq!(c.publisher.as_deref(), Some("Ace Books"));
        assert_eq!(c.physical_format.as_deref(), Some("paperback"));
        assert_eq!(
            c.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/99-L.jpg")
        );
        assert_eq!(c.description.as_deref(), Some("An edition"));
        assert_eq!(c.external_ids.get("goodreads").map(String::as_str), Some("123"));
        let series = c.series.unwrap();
        assert_eq!(series.name, "Dune");
        assert_eq!(series.position, Some(1.0));
        assert_eq!(c.score, 6);
    }
}
