use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One decoded dump line: the record key from the id column plus the parsed
/// JSON payload. Produced by the reader, consumed once.
#[derive(Debug, Clone)]
pub struct DumpRecord {
    pub key: String,
    pub data: serde_json::Value,
}

/// Series membership parsed from an edition's series strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub position: Option<f64>,
}

/// A prepared author row, ready for the slug-keyed upsert.
#[derive(Debug, Clone)]
pub struct NewAuthor {
    pub name: String,
    pub slug: String,
    pub bio: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub death_date: Option<NaiveDate>,
    pub photo_url: Option<String>,
    pub open_library_id: String,
    pub wikidata_id: Option<String>,
    pub wikipedia_url: Option<String>,
    pub remote_ids: BTreeMap<String, String>,
    pub alternate_names: Vec<String>,
}

/// A genre tag derived from a work's subjects.
#[derive(Debug, Clone)]
pub struct Genre {
    pub name: String,
    pub slug: String,
}

/// A prepared book row with resolved relations, ready for insert-or-merge.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub language: String,
    pub slug: String,
    pub description: Option<String>,
    pub original_publication_year: Option<i32>,
    pub primary_cover_url: Option<String>,
    pub open_library_id: String,
    pub author_ids: Vec<i64>,
    pub genres: Vec<Genre>,
}

/// Enrichment values extracted from one Wikidata entity line.
#[derive(Debug, Clone)]
pub struct WikidataUpdate {
    pub wikidata_id: String,
    pub nationality: Option<String>,
    pub birth_place: Option<String>,
    pub wikipedia_url: Option<String>,
}

/// Author map value: external id resolved to the catalog row.
#[derive(Debug, Clone)]
pub struct AuthorMapEntry {
    pub author_id: i64,
    pub name: String,
    pub slug: String,
}

/// Book map value: one language variant of a work.
#[derive(Debug, Clone)]
pub struct BookMapRow {
    pub book_id: i64,
    pub language: String,
    pub slug: String,
}

/// Running best edition for one (work, language) pair. Replaced whenever a
/// higher-scoring edition is seen; `isbns` accumulates the union across every
/// edition of the pair regardless of which one wins.
#[derive(Debug, Clone)]
pub struct EditionCandidate {
    pub work_ol_id: String,
    pub language: String,
    pub isbns: Vec<String>,
    pub page_count: Option<i64>,
    pub publisher: Option<String>,
    pub physical_format: Option<String>,
    pub external_ids: BTreeMap<String, String>,
    pub cover_url: Option<String>,
    pub description: Option<String>,
    pub series: Option<Series>,
    pub score: u8,
}

/// Per-work rating aggregate built in one pass over the ratings dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatingAggregate {
    pub count: u64,
    pub total: u64,
}

impl RatingAggregate {
    /// Average rounded to 2 decimal places.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.total as f64 / self.count as f64 * 100.0).round() / 100.0
    }
}

/// Per-work shelf counters built in one pass over the reading-log dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShelfCounts {
    pub want: u64,
    pub reading: u64,
    pub read: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AuthorsReport {
    pub processed: u64,
    pub upserted: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WikidataReport {
    pub scanned: u64,
    pub updated: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorksReport {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub unresolved_author_refs: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EditionsReport {
    pub scanned: u64,
    pub skipped: u64,
    pub enriched: u64,
    pub new_language_rows: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RatingsReport {
    pub works: u64,
    pub rows_updated: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReadingLogReport {
    pub works: u64,
    pub rows_updated: u64,
}

/// Reports from every phase that has run so far. `None` means the phase has
/// not run (disabled phases stay `None` and are omitted from the summary).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseReports {
    pub authors: Option<AuthorsReport>,
    pub wikidata: Option<WikidataReport>,
    pub works: Option<WorksReport>,
    pub editions: Option<EditionsReport>,
    pub ratings: Option<RatingsReport>,
    pub reading_log: Option<ReadingLogReport>,
}

impl PhaseReports {
    /// Final status text: counts from every phase that ran.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(a) = &self.authors {
            parts.push(format!("{} authors", a.upserted));
        }
        if let Some(w) = &self.wikidata {
            parts.push(format!("{} wikidata enriched", w.updated));
        }
        if let Some(w) = &self.works {
            parts.push(format!("{} works", w.successful));
        }
        if let Some(e) = &self.editions {
            parts.push(format!("{} editions enriched", e.enriched));
            parts.push(format!("{} new language rows", e.new_language_rows));
        }
        if let Some(r) = &self.ratings {
            parts.push(format!("{} ratings applied", r.rows_updated));
        }
        if let Some(r) = &self.reading_log {
            parts.push(format!("{} reading log applied", r.rows_updated));
        }
        format!("Complete: {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_average_rounds_to_two_places() {
        let agg = RatingAggregate { count: 3, total: 10 };
        assert_eq!(agg.average(), 3.33);
        let agg = RatingAggregate { count: 3, total: 12 };
        assert_eq!(agg.average(), 4.0);
    }

    #[test]
    fn rating_average_empty_is_zero() {
        assert_eq!(RatingAggregate::default().average(), 0.0);
    }

    #[test]
    fn summary_skips_phases_that_did_not_run() {
        let reports = PhaseReports {
            authors: Some(AuthorsReport {
                processed: 10,
                upserted: 9,
                skipped: 1,
            }),
            works: Some(WorksReport {
                processed: 5,
                successful: 5,
                failed: 0,
                unresolved_author_refs: 0,
            }),
            ..PhaseReports::default()
        };
        assert_eq!(reports.summary(), "Complete: 9 authors, 5 works");
    }

    #[test]
    fn summary_includes_edition_counts() {
        let reports = PhaseReports {
            editions: Some(EditionsReport {
                scanned: 100,
                skipped: 40,
                enriched: 50,
                new_language_rows: 10,
            }),
            ..PhaseReports::default()
        };
        assert_eq!(
            reports.summary(),
            "Complete: 50 editions enriched, 10 new language rows"
        );
    }
}
