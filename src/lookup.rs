//! Lookup maps rebuilt between phases. The author map is built once after
//! the author phase and is read-only from then on; the book map is built once
//! after the work phase and only ever grows, when the edition phase clones a
//! new language row.

use crate::models::{AuthorMapEntry, BookMapRow};
use crate::store::CatalogStore;
use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::info;

/// External author id -> catalog author row.
pub struct AuthorMap {
    entries: FxHashMap<String, AuthorMapEntry>,
}

impl AuthorMap {
    pub fn build(store: &CatalogStore) -> Result<Self> {
        let entries: FxHashMap<String, AuthorMapEntry> =
            store.author_map_rows()?.into_iter().collect();
        info!(authors = entries.len(), "author map built");
        Ok(Self { entries })
    }

    pub fn resolve(&self, ol_id: &str) -> Option<&AuthorMapEntry> {
        self.entries.get(ol_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// External work id -> every language row of that work.
pub struct BookMap {
    entries: FxHashMap<String, Vec<BookMapRow>>,
}

impl BookMap {
    pub fn build(store: &CatalogStore) -> Result<Self> {
        let mut entries: FxHashMap<String, Vec<BookMapRow>> = FxHashMap::default();
        let mut rows = 0usize;
        for (ol_id, row) in store.book_map_rows()? {
            entries.entry(ol_id).or_default().push(row);
            rows += 1;
        }
        info!(works = entries.len(), rows, "book map built");
        Ok(Self { entries })
    }

    pub fn contains(&self, work_ol_id: &str) -> bool {
        self.entries.contains_key(work_ol_id)
    }

    pub fn rows(&self, work_ol_id: &str) -> Option<&[BookMapRow]> {
        self.entries.get(work_ol_id).map(Vec::as_slice)
    }

    /// Records a freshly cloned language row so later phases can target it.
    pub fn append(&mut self, work_ol_id: &str, row: BookMapRow) {
        self.entries
            .entry(work_ol_id.to_string())
            .or_default()
            .push(row);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_map_append_targets_later_lookups() {
        let mut map = BookMap {
            entries: FxHashMap::default(),
        };
        map.append(
            "OL1W",
            BookMapRow {
                book_id: 1,
                language: "en".to_string(),
                slug: "dune".to_string(),
            },
        );
        map.append(
            "OL1W",
            BookMapRow {
                book_id: 2,
                language: "fr".to_string(),
                slug: "dune".to_string(),
            },
        );
        assert!(map.contains("OL1W"));
        assert_eq!(map.rows("OL1W").unwrap().len(), 2);
        assert!(!map.contains("OL2W"));
    }
}
