//! Phase 1: author ingest. Streams `/type/author` records, prepares rows,
//! deduplicates slugs within each batch, and upserts by slug with
//! fill-if-null merge semantics.

use crate::config::{DumpConfig, MAX_ALTERNATE_NAMES, MAX_NAME_LEN};
use crate::fields;
use crate::models::{AuthorsReport, NewAuthor};
use crate::normalize;
use crate::reader::{DumpReader, LineFormat};
use crate::store::CatalogStore;
use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

pub async fn run(path: &Path, store: &mut CatalogStore, cfg: &DumpConfig) -> Result<AuthorsReport> {
    let mut reader = DumpReader::spawn(
        path,
        LineFormat::TypeTagged {
            tag: "/type/author".to_string(),
        },
        cfg.batch_size,
    );

    let mut report = AuthorsReport::default();
    let mut last_committed = 0u64;

    store.begin()?;
    while let Some(batch) = reader.next_batch().await {
        let mut rows = Vec::with_capacity(batch.len());
        for record in &batch {
            report.processed += 1;
            match prepare_author(&record.data) {
                Some(row) => rows.push(row),
                None => report.skipped += 1,
            }
        }

        let rows = dedup_by_slug(rows);

        if !rows.is_empty() {
            match store.upsert_authors(&rows) {
                Ok(()) => report.upserted += rows.len() as u64,
                Err(e) => {
                    warn!(error = %e, "author batch upsert failed, rolling back");
                    store.rollback();
                    store.begin()?;
                }
            }
        }

        if report.processed - last_committed >= cfg.commit_interval {
            store.commit()?;
            store.begin()?;
            last_committed = report.processed;
            info!(processed = report.processed, "authors processed");
        }
    }
    store.commit()?;
    reader.finish()?;

    info!(
        processed = report.processed,
        upserted = report.upserted,
        skipped = report.skipped,
        "author phase complete"
    );
    Ok(report)
}

/// Within-batch dedup: when two records slugify identically, only the
/// last-occurring one survives, kept at its original relative position.
/// Earlier duplicates are discarded wholesale, including fields the survivor
/// lacks -- a long-standing import semantic, preserved as-is.
fn dedup_by_slug(rows: Vec<NewAuthor>) -> Vec<NewAuthor> {
    let mut last_index: FxHashMap<String, usize> = FxHashMap::default();
    for (idx, row) in rows.iter().enumerate() {
        last_index.insert(row.slug.clone(), idx);
    }
    let keep: FxHashSet<usize> = last_index.into_values().collect();
    rows.into_iter()
        .enumerate()
        .filter(|(idx, _)| keep.contains(idx))
        .map(|(_, row)| row)
        .collect()
}

fn prepare_author(data: &Value) -> Option<NewAuthor> {
    let name = data.get("name")?.as_str()?;
    if name.is_empty() {
        return None;
    }
    let name = normalize::truncate_chars(name, MAX_NAME_LEN).to_string();
    let slug = normalize::slugify(&name);
    if slug.is_empty() {
        return None;
    }

    let bio = data.get("bio").and_then(fields::description);
    let photo_url = data.get("photos").and_then(fields::photo_url);

    let remote_ids = fields::remote_ids(data);
    let wikidata_id = remote_ids.get("wikidata").cloned();
    let wikipedia_url = data
        .get("wikipedia")
        .and_then(Value::as_str)
        .filter(|url| url.starts_with("http"))
        .map(str::to_string);

    let alternate_names: Vec<String> = data
        .get("alternate_names")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .filter(|n| !n.is_empty())
                .take(MAX_ALTERNATE_NAMES)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let birth_date = data
        .get("birth_date")
        .and_then(fields::date_text)
        .and_then(|d| normalize::parse_free_date(&d));
    let death_date = data
        .get("death_date")
        .and_then(fields::date_text)
        .and_then(|d| normalize::parse_free_date(&d));

    let open_library_id = data
        .get("key")
        .map(|key| fields::key_suffix(key, "/authors/").unwrap_or_default())
        .unwrap_or_default()
        .to_string();

    Some(NewAuthor {
        name,
        slug,
        bio,
        birth_date,
        death_date,
        photo_url,
        open_library_id,
        wikidata_id,
        wikipedia_url,
        remote_ids,
        alternate_names,
    })
}
