//! Phase 3: work ingest. Streams `/type/work` records, resolves author
//! references through the author map, derives genre tags from subjects, and
//! hands the prepared books to the repository's insert-or-merge, always as
//! language "en".

use crate::config::{DumpConfig, MAX_GENRE_NAME_LEN, MAX_GENRE_SLUG_LEN, MAX_GENRES_PER_WORK};
use crate::fields;
use crate::lookup::AuthorMap;
use crate::models::{Genre, NewBook, WorksReport};
use crate::normalize;
use crate::reader::{DumpReader, LineFormat};
use crate::store::{BookRepository, CatalogStore};
use anyhow::Result;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

pub async fn run(
    path: &Path,
    store: &mut CatalogStore,
    author_map: &AuthorMap,
    cfg: &DumpConfig,
) -> Result<WorksReport> {
    let mut reader = DumpReader::spawn(
        path,
        LineFormat::TypeTagged {
            tag: "/type/work".to_string(),
        },
        cfg.batch_size,
    );

    let mut report = WorksReport::default();
    let mut last_committed = 0u64;

    store.begin()?;
    while let Some(batch) = reader.next_batch().await {
        let mut books = Vec::with_capacity(batch.len());
        for record in &batch {
            report.processed += 1;
            match prepare_work(&record.data, author_map, &mut report.unresolved_author_refs) {
                Some(book) => books.push(book),
                None => report.failed += 1,
            }
        }

        if !books.is_empty() {
            match store.insert_or_merge(&books) {
                Ok(outcome) => {
                    report.successful += outcome.successful;
                    report.failed += outcome.failed;
                }
                Err(e) => {
                    warn!(error = %e, "work batch insert failed, rolling back");
                    store.rollback();
                    store.begin()?;
                    report.failed += books.len() as u64;
                }
            }
        }

        if report.processed - last_committed >= cfg.commit_interval {
            store.commit()?;
            store.begin()?;
            last_committed = report.processed;
            info!(
                processed = report.processed,
                successful = report.successful,
                failed = report.failed,
                "works processed"
            );
        }
    }
    store.commit()?;
    reader.finish()?;

    info!(
        processed = report.processed,
        successful = report.successful,
        failed = report.failed,
        unresolved_author_refs = report.unresolved_author_refs,
        "work phase complete"
    );
    Ok(report)
}

fn prepare_work(
    data: &Value,
    author_map: &AuthorMap,
    unresolved: &mut u64,
) -> Option<NewBook> {
    let title = data.get("title")?.as_str()?;
    if title.is_empty() {
        return None;
    }
    let slug = normalize::slugify(title);
    if slug.is_empty() {
        return None;
    }

    // unresolved references are dropped, they never block the record
    let mut author_ids = Vec::new();
    if let Some(refs) = data.get("authors").and_then(Value::as_array) {
        for author_ref in refs {
            let Some(ol_id) = author_ref
                .get("author")
                .and_then(|a| fields::key_suffix(a, "/authors/"))
            else {
                continue;
            };
            match author_map.resolve(ol_id) {
                Some(entry) => author_ids.push(entry.author_id),
                None => *unresolved += 1,
            }
        }
    }

    let genres = data
        .get("subjects")
        .and_then(Value::as_array)
        .map(|subjects| {
            subjects
                .iter()
                .take(MAX_GENRES_PER_WORK)
                .filter_map(Value::as_str)
                .filter_map(|subject| {
                    let name =
                        normalize::truncate_chars(&subject.to_lowercase(), MAX_GENRE_NAME_LEN)
                            .to_string();
                    let genre_slug =
                        normalize::truncate_chars(&normalize::slugify(&name), MAX_GENRE_SLUG_LEN)
                            .to_string();
                    if genre_slug.is_empty() {
                        None
                    } else {
                        Some(Genre {
                            name,
                            slug: genre_slug,
                        })
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let description = data.get("description").and_then(fields::description);
    let original_publication_year = data
        .get("first_publish_date")
        .and_then(fields::date_text)
        .and_then(|d| normalize::parse_free_date(&d))
        .map(|d| chrono::Datelike::year(&d));
    let primary_cover_url = data.get("covers").and_then(fields::cover_url);
    let open_library_id = data
        .get("key")
        .and_then(|key| fields::key_suffix(key, "/works/"))
        .unwrap_or_default()
        .to_string();

    Some(NewBook {
        title: title.to_string(),
        language: "en".to_string(),
        slug,
        description,
        original_publication_year,
        primary_cover_url,
        open_library_id,
        author_ids,
        genres,
    })
}
