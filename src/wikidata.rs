//! Phase 2: Wikidata enrichment. Streams the cross-reference dump of
//! `QID<TAB>entity JSON` lines, pulls nationality (P27), birth place (P19),
//! and the English Wikipedia sitelink out of each entity, and fills the
//! matching author rows where they are still null.

use crate::config::{DumpConfig, MAX_BIRTH_PLACE_LEN, MAX_NATIONALITY_LEN, MAX_URL_LEN};
use crate::fields;
use crate::models::{WikidataReport, WikidataUpdate};
use crate::normalize;
use crate::reader::{DumpReader, LineFormat};
use crate::store::CatalogStore;
use anyhow::Result;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

pub async fn run(
    path: &Path,
    store: &mut CatalogStore,
    cfg: &DumpConfig,
) -> Result<WikidataReport> {
    let mut reader = DumpReader::spawn(path, LineFormat::KeyedJson, cfg.batch_size);

    let mut report = WikidataReport::default();
    let mut last_committed = 0u64;

    store.begin()?;
    while let Some(batch) = reader.next_batch().await {
        let mut updates = Vec::with_capacity(batch.len());
        for record in &batch {
            report.scanned += 1;
            if let Some(update) = extract_enrichment(&record.key, &record.data) {
                updates.push(update);
            }
        }

        if !updates.is_empty() {
            match store.apply_wikidata(&updates) {
                Ok(changed) => report.updated += changed,
                Err(e) => {
                    warn!(error = %e, "wikidata batch update failed, rolling back");
                    store.rollback();
                    store.begin()?;
                }
            }
        }

        if report.scanned - last_committed >= cfg.commit_interval {
            store.commit()?;
            store.begin()?;
            last_committed = report.scanned;
            info!(
                scanned = report.scanned,
                updated = report.updated,
                "wikidata entities scanned"
            );
        }
    }
    store.commit()?;
    reader.finish()?;

    info!(
        scanned = report.scanned,
        updated = report.updated,
        "wikidata phase complete"
    );
    Ok(report)
}

/// Values usable by a catalog are human-readable labels; claims carrying a
/// bare entity id (or an object reference) have nothing to show a reader.
fn first_claim_label(entity: &Value, property: &str) -> Option<String> {
    let claims = entity.get("claims")?.get(property)?.as_array()?;
    for claim in claims {
        let Some(value) = claim
            .get("mainsnak")
            .and_then(|snak| snak.get("datavalue"))
            .and_then(|datavalue| datavalue.get("value"))
        else {
            continue;
        };
        if let Some(label) = value.as_str() {
            if !label.is_empty() && !fields::is_qid(label) {
                return Some(label.to_string());
            }
        }
    }
    None
}

fn enwiki_url(entity: &Value) -> Option<String> {
    let title = entity
        .get("sitelinks")?
        .get("enwiki")?
        .get("title")?
        .as_str()?;
    if title.is_empty() {
        return None;
    }
    Some(format!(
        "https://en.wikipedia.org/wiki/{}",
        title.replace(' ', "_")
    ))
}

/// One entity line turned into an update, or `None` when it has nothing to
/// contribute.
fn extract_enrichment(qid: &str, entity: &Value) -> Option<WikidataUpdate> {
    let nationality = first_claim_label(entity, "P27")
        .map(|v| normalize::truncate_chars(&v, MAX_NATIONALITY_LEN).to_string());
    let birth_place = first_claim_label(entity, "P19")
        .map(|v| normalize::truncate_chars(&v, MAX_BIRTH_PLACE_LEN).to_string());
    let wikipedia_url =
        enwiki_url(entity).map(|u| normalize::truncate_chars(&u, MAX_URL_LEN).to_string());

    if nationality.is_none() && birth_place.is_none() && wikipedia_url.is_none() {
        return None;
    }
    Some(WikidataUpdate {
        wikidata_id: qid.to_string(),
        nationality,
        birth_place,
        wikipedia_url,
    })
}
