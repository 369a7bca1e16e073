//! SQLite-backed catalog store. The catalog schema proper lives with the
//! serving system; this store carries only the surface the import pipeline
//! touches: slug-keyed author upserts, (language, slug)-keyed book rows with
//! author/genre relations, and the numeric rating/reading-log columns.
//!
//! Merge semantics are conflict-safe throughout: enrichment columns fill only
//! when currently null, while identifier columns (`open_library_id`, ISBN
//! lists, external-id maps) always take the incoming value.

use crate::config::{MAX_ISBNS_PER_BOOK, MAX_PUBLISHER_LEN, MAX_TITLE_LEN, MAX_URL_LEN};
use crate::models::{
    AuthorMapEntry, BookMapRow, EditionCandidate, NewAuthor, NewBook, ShelfCounts, WikidataUpdate,
};
use crate::normalize;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS authors (
    author_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name             TEXT NOT NULL,
    slug             TEXT NOT NULL UNIQUE,
    bio              TEXT,
    birth_date       TEXT,
    death_date       TEXT,
    photo_url        TEXT,
    open_library_id  TEXT,
    wikidata_id      TEXT,
    wikipedia_url    TEXT,
    nationality      TEXT,
    birth_place      TEXT,
    remote_ids       TEXT NOT NULL DEFAULT '{}',
    alternate_names  TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_authors_open_library_id ON authors(open_library_id);
CREATE INDEX IF NOT EXISTS idx_authors_wikidata_id ON authors(wikidata_id);

CREATE TABLE IF NOT EXISTS books (
    book_id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    title                       TEXT NOT NULL,
    language                    TEXT NOT NULL,
    slug                        TEXT NOT NULL,
    description                 TEXT,
    original_publication_year   INTEGER,
    primary_cover_url           TEXT,
    isbn                        TEXT NOT NULL DEFAULT '[]',
    publisher                   TEXT,
    number_of_pages             INTEGER,
    physical_format             TEXT,
    external_ids                TEXT NOT NULL DEFAULT '{}',
    open_library_id             TEXT,
    ol_rating_count             INTEGER NOT NULL DEFAULT 0,
    ol_avg_rating               REAL,
    ol_want_to_read_count       INTEGER NOT NULL DEFAULT 0,
    ol_currently_reading_count  INTEGER NOT NULL DEFAULT 0,
    ol_already_read_count       INTEGER NOT NULL DEFAULT 0,
    series_id                   INTEGER,
    series_position             REAL,
    UNIQUE (language, slug)
);
CREATE INDEX IF NOT EXISTS idx_books_open_library_id ON books(open_library_id);

CREATE TABLE IF NOT EXISTS genres (
    genre_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    slug      TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS book_authors (
    book_id    INTEGER NOT NULL,
    author_id  INTEGER NOT NULL,
    PRIMARY KEY (book_id, author_id)
);

CREATE TABLE IF NOT EXISTS book_genres (
    book_id   INTEGER NOT NULL,
    genre_id  INTEGER NOT NULL,
    PRIMARY KEY (book_id, genre_id)
);
"#;

const AUTHOR_UPSERT: &str = r#"
INSERT INTO authors (name, slug, bio, birth_date, death_date, photo_url,
                     open_library_id, wikidata_id, wikipedia_url, remote_ids, alternate_names)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
ON CONFLICT(slug) DO UPDATE SET
    bio             = COALESCE(bio, excluded.bio),
    birth_date      = COALESCE(birth_date, excluded.birth_date),
    death_date      = COALESCE(death_date, excluded.death_date),
    photo_url       = COALESCE(photo_url, excluded.photo_url),
    open_library_id = excluded.open_library_id,
    wikidata_id     = COALESCE(wikidata_id, excluded.wikidata_id),
    wikipedia_url   = COALESCE(wikipedia_url, excluded.wikipedia_url),
    remote_ids      = excluded.remote_ids,
    alternate_names = excluded.alternate_names
"#;

const BOOK_UPSERT: &str = r#"
INSERT INTO books (title, language, slug, description, original_publication_year,
                   primary_cover_url, open_library_id)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(language, slug) DO UPDATE SET
    description               = COALESCE(description, excluded.description),
    original_publication_year = COALESCE(original_publication_year, excluded.original_publication_year),
    primary_cover_url         = COALESCE(primary_cover_url, excluded.primary_cover_url),
    open_library_id           = excluded.open_library_id
RETURNING book_id
"#;

const EDITION_MERGE: &str = r#"
UPDATE books SET
    isbn              = CASE WHEN ?2 IS NOT NULL THEN ?2 ELSE isbn END,
    number_of_pages   = COALESCE(number_of_pages, ?3),
    publisher         = COALESCE(publisher, ?4),
    external_ids      = CASE WHEN ?5 IS NOT NULL THEN ?5 ELSE external_ids END,
    primary_cover_url = COALESCE(primary_cover_url, ?6),
    description       = COALESCE(description, ?7),
    physical_format   = COALESCE(physical_format, ?8)
WHERE book_id = ?1
"#;

const LANGUAGE_CLONE: &str = r#"
INSERT INTO books (title, language, slug, description, original_publication_year,
                   primary_cover_url, open_library_id, isbn, publisher, number_of_pages,
                   physical_format, external_ids, series_id, series_position)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
ON CONFLICT(language, slug) DO UPDATE SET
    isbn            = excluded.isbn,
    publisher       = excluded.publisher,
    number_of_pages = excluded.number_of_pages,
    external_ids    = excluded.external_ids
RETURNING book_id
"#;

/// Per-batch outcome of the insert-or-merge step; failures are absorbed, not
/// raised.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOutcome {
    pub successful: u64,
    pub failed: u64,
}

/// Seam for the work-ingest phase: creates or merges books with relations,
/// matching existing rows by (language, slug), never failing per record.
pub trait BookRepository {
    fn insert_or_merge(&mut self, books: &[NewBook]) -> Result<MergeOutcome>;
}

pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open catalog database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .context("failed to set catalog pragmas")?;
        conn.execute_batch(SCHEMA)
            .context("failed to apply catalog schema")?;
        Ok(Self { conn })
    }

    // One open transaction at a time; the phases own the commit-interval
    // policy, so the store only exposes the primitives.

    pub fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .context("failed to begin transaction")
    }

    pub fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("failed to commit transaction")
    }

    /// Best-effort rollback: recovering from a failed batch must not itself
    /// fail the phase.
    pub fn rollback(&mut self) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            debug!(error = %e, "rollback failed");
        }
    }

    // --- authors ---

    pub fn upsert_authors(&mut self, rows: &[NewAuthor]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(AUTHOR_UPSERT)?;
        for row in rows {
            stmt.execute(params![
                row.name,
                row.slug,
                row.bio,
                row.birth_date.map(|d| d.to_string()),
                row.death_date.map(|d| d.to_string()),
                row.photo_url,
                row.open_library_id,
                row.wikidata_id,
                row.wikipedia_url,
                serde_json::to_string(&row.remote_ids)?,
                serde_json::to_string(&row.alternate_names)?,
            ])?;
        }
        Ok(())
    }

    /// Fill-if-null enrichment against authors matched by wikidata id.
    /// Returns the number of rows touched; no rows are created.
    pub fn apply_wikidata(&mut self, updates: &[WikidataUpdate]) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached(
            "UPDATE authors SET
                 nationality   = COALESCE(nationality, ?2),
                 birth_place   = COALESCE(birth_place, ?3),
                 wikipedia_url = COALESCE(wikipedia_url, ?4)
             WHERE wikidata_id = ?1",
        )?;
        let mut changed = 0u64;
        for update in updates {
            changed += stmt.execute(params![
                update.wikidata_id,
                update.nationality,
                update.birth_place,
                update.wikipedia_url,
            ])? as u64;
        }
        Ok(changed)
    }

    // --- lookup map sources ---

    pub fn author_map_rows(&self) -> Result<Vec<(String, AuthorMapEntry)>> {
        let mut stmt = self.conn.prepare(
            "SELECT open_library_id, author_id, name, slug FROM authors
             WHERE open_library_id IS NOT NULL AND open_library_id != ''",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                AuthorMapEntry {
                    author_id: row.get(1)?,
                    name: row.get(2)?,
                    slug: row.get(3)?,
                },
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load author map rows")
    }

    pub fn book_map_rows(&self) -> Result<Vec<(String, BookMapRow)>> {
        let mut stmt = self.conn.prepare(
            "SELECT open_library_id, book_id, language, slug FROM books
             WHERE open_library_id IS NOT NULL AND open_library_id != ''",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                BookMapRow {
                    book_id: row.get(1)?,
                    language: row.get(2)?,
                    slug: row.get(3)?,
                },
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load book map rows")
    }

    // --- works ---

    fn insert_or_merge_one(&mut self, book: &NewBook) -> Result<i64> {
        let book_id: i64 = self.conn.prepare_cached(BOOK_UPSERT)?.query_row(
            params![
                book.title,
                book.language,
                book.slug,
                book.description,
                book.original_publication_year,
                book.primary_cover_url,
                book.open_library_id,
            ],
            |row| row.get(0),
        )?;

        {
            let mut link = self
                .conn
                .prepare_cached("INSERT OR IGNORE INTO book_authors (book_id, author_id) VALUES (?1, ?2)")?;
            for author_id in &book.author_ids {
                link.execute(params![book_id, author_id])?;
            }
        }

        for genre in &book.genres {
            self.conn
                .prepare_cached(
                    "INSERT INTO genres (name, slug) VALUES (?1, ?2) ON CONFLICT(slug) DO NOTHING",
                )?
                .execute(params![genre.name, genre.slug])?;
            let genre_id: i64 = self
                .conn
                .prepare_cached("SELECT genre_id FROM genres WHERE slug = ?1")?
                .query_row(params![genre.slug], |row| row.get(0))?;
            self.conn
                .prepare_cached("INSERT OR IGNORE INTO book_genres (book_id, genre_id) VALUES (?1, ?2)")?
                .execute(params![book_id, genre_id])?;
        }

        Ok(book_id)
    }

    // --- editions ---

    /// Merge a best-edition candidate into an existing (work, language) row.
    pub fn enrich_book(&mut self, book_id: i64, candidate: &EditionCandidate) -> Result<()> {
        let isbn_json = isbn_json(&candidate.isbns)?;
        let ext_json = external_ids_json(&candidate.external_ids)?;
        self.conn.prepare_cached(EDITION_MERGE)?.execute(params![
            book_id,
            isbn_json,
            candidate.page_count,
            candidate
                .publisher
                .as_deref()
                .map(|p| normalize::truncate_chars(p, MAX_PUBLISHER_LEN)),
            ext_json,
            candidate
                .cover_url
                .as_deref()
                .map(|u| normalize::truncate_chars(u, MAX_URL_LEN)),
            candidate.description,
            candidate.physical_format,
        ])?;
        Ok(())
    }

    /// Clone the English row of a work into a new language variant, seeded
    /// with the candidate's edition fields, and copy all author and genre
    /// relations from the source row. Returns the new row for the book map.
    pub fn clone_language_row(
        &mut self,
        source_book_id: i64,
        candidate: &EditionCandidate,
    ) -> Result<Option<BookMapRow>> {
        struct SourceRow {
            title: String,
            description: Option<String>,
            publication_year: Option<i32>,
            cover_url: Option<String>,
            series_id: Option<i64>,
            series_position: Option<f64>,
        }

        let source = self
            .conn
            .prepare_cached(
                "SELECT title, description, original_publication_year, primary_cover_url,
                        series_id, series_position
                 FROM books WHERE book_id = ?1",
            )?
            .query_row(params![source_book_id], |row| {
                Ok(SourceRow {
                    title: row.get(0)?,
                    description: row.get(1)?,
                    publication_year: row.get(2)?,
                    cover_url: row.get(3)?,
                    series_id: row.get(4)?,
                    series_position: row.get(5)?,
                })
            })
            .optional()?;
        let Some(source) = source else {
            return Ok(None);
        };

        let slug = normalize::slugify(&source.title);
        if slug.is_empty() {
            return Ok(None);
        }
        let title = normalize::truncate_chars(&source.title, MAX_TITLE_LEN);
        let cover_url = candidate
            .cover_url
            .clone()
            .or(source.cover_url)
            .map(|u| normalize::truncate_chars(&u, MAX_URL_LEN).to_string());
        let description = candidate.description.clone().or(source.description);
        let series_position = source.series_position.filter(|p| *p <= 999.99);

        let book_id: i64 = self.conn.prepare_cached(LANGUAGE_CLONE)?.query_row(
            params![
                title,
                candidate.language,
                slug,
                description,
                source.publication_year,
                cover_url,
                candidate.work_ol_id,
                isbn_json(&candidate.isbns)?.unwrap_or_else(|| "[]".to_string()),
                candidate
                    .publisher
                    .as_deref()
                    .map(|p| normalize::truncate_chars(p, MAX_PUBLISHER_LEN)),
                candidate.page_count,
                candidate.physical_format,
                external_ids_json(&candidate.external_ids)?.unwrap_or_else(|| "{}".to_string()),
                source.series_id,
                series_position,
            ],
            |row| row.get(0),
        )?;

        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO book_authors (book_id, author_id)
                 SELECT ?1, author_id FROM book_authors WHERE book_id = ?2",
            )?
            .execute(params![book_id, source_book_id])?;
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO book_genres (book_id, genre_id)
                 SELECT ?1, genre_id FROM book_genres WHERE book_id = ?2",
            )?
            .execute(params![book_id, source_book_id])?;

        Ok(Some(BookMapRow {
            book_id,
            language: candidate.language.clone(),
            slug,
        }))
    }

    // --- aggregates ---

    pub fn apply_ratings(&mut self, updates: &[(i64, u64, f64)]) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached(
            "UPDATE books SET ol_rating_count = ?2, ol_avg_rating = ?3 WHERE book_id = ?1",
        )?;
        let mut changed = 0u64;
        for (book_id, count, avg) in updates {
            changed += stmt.execute(params![book_id, count, avg])? as u64;
        }
        Ok(changed)
    }

    pub fn apply_reading_log(&mut self, updates: &[(i64, ShelfCounts)]) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached(
            "UPDATE books SET
                 ol_want_to_read_count      = ?2,
                 ol_currently_reading_count = ?3,
                 ol_already_read_count      = ?4
             WHERE book_id = ?1",
        )?;
        let mut changed = 0u64;
        for (book_id, counts) in updates {
            changed += stmt.execute(params![book_id, counts.want, counts.reading, counts.read])?
                as u64;
        }
        Ok(changed)
    }

    // --- read surface for verification and downstream consumers ---

    pub fn author_by_slug(&self, slug: &str) -> Result<Option<AuthorRecord>> {
        self.conn
            .prepare_cached(
                "SELECT author_id, name, slug, bio, birth_date, death_date, photo_url,
                        open_library_id, wikidata_id, wikipedia_url, nationality, birth_place,
                        remote_ids, alternate_names
                 FROM authors WHERE slug = ?1",
            )?
            .query_row(params![slug], |row| {
                Ok(AuthorRecord {
                    author_id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    bio: row.get(3)?,
                    birth_date: row.get(4)?,
                    death_date: row.get(5)?,
                    photo_url: row.get(6)?,
                    open_library_id: row.get(7)?,
                    wikidata_id: row.get(8)?,
                    wikipedia_url: row.get(9)?,
                    nationality: row.get(10)?,
                    birth_place: row.get(11)?,
                    remote_ids_json: row.get(12)?,
                    alternate_names_json: row.get(13)?,
                })
            })
            .optional()
            .context("failed to read author")
    }

    pub fn book_by_id(&self, book_id: i64) -> Result<Option<BookRecord>> {
        self.book_where("book_id = ?1", params![book_id])
    }

    pub fn book_by_language_slug(&self, language: &str, slug: &str) -> Result<Option<BookRecord>> {
        self.book_where("language = ?1 AND slug = ?2", params![language, slug])
    }

    fn book_where(
        &self,
        predicate: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<BookRecord>> {
        let sql = format!(
            "SELECT book_id, title, language, slug, description, original_publication_year,
                    primary_cover_url, isbn, publisher, number_of_pages, physical_format,
                    external_ids, open_library_id, ol_rating_count, ol_avg_rating,
                    ol_want_to_read_count, ol_currently_reading_count, ol_already_read_count,
                    series_id, series_position
             FROM books WHERE {predicate}"
        );
        self.conn
            .prepare(&sql)?
            .query_row(params, |row| {
                Ok(BookRecord {
                    book_id: row.get(0)?,
                    title: row.get(1)?,
                    language: row.get(2)?,
                    slug: row.get(3)?,
                    description: row.get(4)?,
                    original_publication_year: row.get(5)?,
                    primary_cover_url: row.get(6)?,
                    isbn_json: row.get(7)?,
                    publisher: row.get(8)?,
                    number_of_pages: row.get(9)?,
                    physical_format: row.get(10)?,
                    external_ids_json: row.get(11)?,
                    open_library_id: row.get(12)?,
                    ol_rating_count: row.get(13)?,
                    ol_avg_rating: row.get(14)?,
                    ol_want_to_read_count: row.get(15)?,
                    ol_currently_reading_count: row.get(16)?,
                    ol_already_read_count: row.get(17)?,
                    series_id: row.get(18)?,
                    series_position: row.get(19)?,
                })
            })
            .optional()
            .context("failed to read book")
    }

    pub fn count_authors(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM authors", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_books(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn book_author_ids(&self, book_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT author_id FROM book_authors WHERE book_id = ?1 ORDER BY author_id")?;
        let rows = stmt.query_map(params![book_id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read book authors")
    }

    pub fn book_genre_slugs(&self, book_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.slug FROM book_genres bg JOIN genres g ON g.genre_id = bg.genre_id
             WHERE bg.book_id = ?1 ORDER BY g.slug",
        )?;
        let rows = stmt.query_map(params![book_id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read book genres")
    }
}

impl BookRepository for CatalogStore {
    fn insert_or_merge(&mut self, books: &[NewBook]) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome::default();
        for book in books {
            match self.insert_or_merge_one(book) {
                Ok(_) => outcome.successful += 1,
                Err(e) => {
                    debug!(error = %e, slug = %book.slug, "insert-or-merge failed");
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }
}

fn isbn_json(isbns: &[String]) -> Result<Option<String>> {
    if isbns.is_empty() {
        return Ok(None);
    }
    let capped = &isbns[..isbns.len().min(MAX_ISBNS_PER_BOOK)];
    Ok(Some(serde_json::to_string(capped)?))
}

fn external_ids_json(ids: &BTreeMap<String, String>) -> Result<Option<String>> {
    if ids.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(ids)?))
}

/// An author row as stored, JSON columns still encoded.
#[derive(Debug, Clone)]
pub struct AuthorRecord {
    pub author_id: i64,
    pub name: String,
    pub slug: String,
    pub bio: Option<String>,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub photo_url: Option<String>,
    pub open_library_id: Option<String>,
    pub wikidata_id: Option<String>,
    pub wikipedia_url: Option<String>,
    pub nationality: Option<String>,
    pub birth_place: Option<String>,
    pub remote_ids_json: String,
    pub alternate_names_json: String,
}

impl AuthorRecord {
    pub fn alternate_names(&self) -> Vec<String> {
        serde_json::from_str(&self.alternate_names_json).unwrap_or_default()
    }

    pub fn remote_ids(&self) -> BTreeMap<String, String> {
        serde_json::from_str(&self.remote_ids_json).unwrap_or_default()
    }
}

/// A book row as stored, JSON columns still encoded.
#[derive(Debug, Clone)]
pub struct BookRecord {
    pub book_id: i64,
    pub title: String,
    pub language: String,
    pub slug: String,
    pub description: Option<String>,
    pub original_publication_year: Option<i32>,
    pub primary_cover_url: Option<String>,
    pub isbn_json: String,
    pub publisher: Option<String>,
    pub number_of_pages: Option<i64>,
    pub physical_format: Option<String>,
    pub external_ids_json: String,
    pub open_library_id: Option<String>,
    pub ol_rating_count: u64,
    pub ol_avg_rating: Option<f64>,
    pub ol_want_to_read_count: u64,
    pub ol_currently_reading_count: u64,
    pub ol_already_read_count: u64,
    pub series_id: Option<i64>,
    pub series_position: Option<f64>,
}

impl BookRecord {
    pub fn isbns(&self) -> Vec<String> {
        serde_json::from_str(&self.isbn_json).unwrap_or_default()
    }

    pub fn external_ids(&self) -> BTreeMap<String, String> {
        serde_json::from_str(&self.external_ids_json).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Genre;

    fn author(name: &str, ol_id: &str) -> NewAuthor {
        NewAuthor {
            name: name.to_string(),
            slug: normalize::slugify(name),
            bio: None,
            birth_date: None,
            death_date: None,
            photo_url: None,
            open_library_id: ol_id.to_string(),
            wikidata_id: None,
            wikipedia_url: None,
            remote_ids: BTreeMap::new(),
            alternate_names: Vec::new(),
        }
    }

    fn book(title: &str, ol_id: &str) -> NewBook {
        NewBook {
            title: title.to_string(),
            language: "en".to_string(),
            slug: normalize::slugify(title),
            description: None,
            original_publication_year: None,
            primary_cover_url: None,
            open_library_id: ol_id.to_string(),
            author_ids: Vec::new(),
            genres: Vec::new(),
        }
    }

    fn candidate(work: &str, language: &str) -> EditionCandidate {
        EditionCandidate {
            work_ol_id: work.to_string(),
            language: language.to_string(),
            isbns: Vec::new(),
            page_count: None,
            publisher: None,
            physical_format: None,
            external_ids: BTreeMap::new(),
            cover_url: None,
            description: None,
            series: None,
            score: 0,
        }
    }

    #[test]
    fn author_upsert_fills_only_null_fields() {
        let mut store = CatalogStore::open_in_memory().unwrap();

        let mut first = author("Frank Herbert", "OL1A");
        first.bio = Some("Original bio".to_string());
        store.upsert_authors(&[first]).unwrap();

        let mut second = author("Frank Herbert", "OL1A-v2");
        second.bio = Some("Replacement bio".to_string());
        second.photo_url = Some("https://covers.example/1.jpg".to_string());
        store.upsert_authors(&[second]).unwrap();

        let stored = store.author_by_slug("frank-herbert").unwrap().unwrap();
        // bio was set, so it keeps the original value
        assert_eq!(stored.bio.as_deref(), Some("Original bio"));
        // photo_url was null, so it fills
        assert_eq!(
            stored.photo_url.as_deref(),
            Some("https://covers.example/1.jpg")
        );
        // the external id always refreshes
        assert_eq!(stored.open_library_id.as_deref(), Some("OL1A-v2"));
        assert_eq!(store.count_authors().unwrap(), 1);
    }

    #[test]
    fn wikidata_update_never_regresses_to_null() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let mut row = author("Ursula K. Le Guin", "OL2A");
        row.wikidata_id = Some("Q181659".to_string());
        store.upsert_authors(&[row]).unwrap();

        let changed = store
            .apply_wikidata(&[WikidataUpdate {
                wikidata_id: "Q181659".to_string(),
                nationality: Some("United States".to_string()),
                birth_place: None,
                wikipedia_url: None,
            }])
            .unwrap();
        assert_eq!(changed, 1);

        // a later update with null nationality must not clear it
        store
            .apply_wikidata(&[WikidataUpdate {
                wikidata_id: "Q181659".to_string(),
                nationality: None,
                birth_place: Some("Berkeley".to_string()),
                wikipedia_url: None,
            }])
            .unwrap();

        let stored = store.author_by_slug("ursula-k-le-guin").unwrap().unwrap();
        assert_eq!(stored.nationality.as_deref(), Some("United States"));
        assert_eq!(stored.birth_place.as_deref(), Some("Berkeley"));
    }

    #[test]
    fn wikidata_update_creates_no_rows() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let changed = store
            .apply_wikidata(&[WikidataUpdate {
                wikidata_id: "Q404".to_string(),
                nationality: Some("Nowhere".to_string()),
                birth_place: None,
                wikipedia_url: None,
            }])
            .unwrap();
        assert_eq!(changed, 0);
        assert_eq!(store.count_authors().unwrap(), 0);
    }

    #[test]
    fn insert_or_merge_is_idempotent_by_language_slug() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let mut dune = book("Dune", "OL1W");
        dune.description = Some("Desert planet".to_string());
        store.insert_or_merge(&[dune.clone()]).unwrap();
        let outcome = store.insert_or_merge(&[dune]).unwrap();
        assert_eq!(outcome.successful, 1);
        assert_eq!(store.count_books().unwrap(), 1);
    }

    #[test]
    fn insert_or_merge_links_authors_and_genres() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        store
            .upsert_authors(&[author("Frank Herbert", "OL1A")])
            .unwrap();
        let entry = &store.author_map_rows().unwrap()[0].1;

        let mut dune = book("Dune", "OL1W");
        dune.author_ids = vec![entry.author_id];
        dune.genres = vec![Genre {
            name: "science fiction".to_string(),
            slug: "science-fiction".to_string(),
        }];
        store.insert_or_merge(&[dune]).unwrap();

        let stored = store.book_by_language_slug("en", "dune").unwrap().unwrap();
        assert_eq!(store.book_author_ids(stored.book_id).unwrap().len(), 1);
        assert_eq!(
            store.book_genre_slugs(stored.book_id).unwrap(),
            vec!["science-fiction"]
        );
    }

    #[test]
    fn enrich_book_fills_nulls_and_overwrites_isbn() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let mut dune = book("Dune", "OL1W");
        dune.description = Some("Original description".to_string());
        store.insert_or_merge(&[dune]).unwrap();
        let stored = store.book_by_language_slug("en", "dune").unwrap().unwrap();

        let mut c = candidate("OL1W", "en");
        c.isbns = vec!["9780441013593".to_string()];
        c.page_count = Some(412);
        c.description = Some("Edition description".to_string());
        store.enrich_book(stored.book_id, &c).unwrap();

        let enriched = store.book_by_id(stored.book_id).unwrap().unwrap();
        assert_eq!(enriched.isbns(), vec!["9780441013593"]);
        assert_eq!(enriched.number_of_pages, Some(412));
        // description was populated, so it does not change
        assert_eq!(enriched.description.as_deref(), Some("Original description"));

        // a later candidate with a different ISBN list overwrites it
        let mut c2 = candidate("OL1W", "en");
        c2.isbns = vec!["0441013597".to_string()];
        store.enrich_book(stored.book_id, &c2).unwrap();
        let again = store.book_by_id(stored.book_id).unwrap().unwrap();
        assert_eq!(again.isbns(), vec!["0441013597"]);
        // but an empty ISBN list leaves the stored list alone
        let c3 = candidate("OL1W", "en");
        store.enrich_book(stored.book_id, &c3).unwrap();
        let kept = store.book_by_id(stored.book_id).unwrap().unwrap();
        assert_eq!(kept.isbns(), vec!["0441013597"]);
    }

    #[test]
    fn clone_language_row_copies_relations_and_source_fields() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        store
            .upsert_authors(&[author("Frank Herbert", "OL1A")])
            .unwrap();
        let author_id = store.author_map_rows().unwrap()[0].1.author_id;

        let mut dune = book("Dune", "OL1W");
        dune.description = Some("Desert planet".to_string());
        dune.author_ids = vec![author_id];
        dune.genres = vec![Genre {
            name: "science fiction".to_string(),
            slug: "science-fiction".to_string(),
        }];
        store.insert_or_merge(&[dune]).unwrap();
        let source = store.book_by_language_slug("en", "dune").unwrap().unwrap();

        let mut c = candidate("OL1W", "fr");
        c.isbns = vec!["2266233201".to_string()];
        c.publisher = Some("Pocket".to_string());
        let new_row = store
            .clone_language_row(source.book_id, &c)
            .unwrap()
            .unwrap();
        assert_eq!(new_row.language, "fr");
        assert_eq!(new_row.slug, "dune");

        let cloned = store.book_by_id(new_row.book_id).unwrap().unwrap();
        assert_eq!(cloned.title, "Dune");
        // cloned description falls back to the source row
        assert_eq!(cloned.description.as_deref(), Some("Desert planet"));
        assert_eq!(cloned.publisher.as_deref(), Some("Pocket"));
        assert_eq!(cloned.isbns(), vec!["2266233201"]);
        assert_eq!(
            store.book_author_ids(cloned.book_id).unwrap(),
            store.book_author_ids(source.book_id).unwrap()
        );
        assert_eq!(
            store.book_genre_slugs(cloned.book_id).unwrap(),
            store.book_genre_slugs(source.book_id).unwrap()
        );
        assert_eq!(store.count_books().unwrap(), 2);
    }

    #[test]
    fn clone_language_row_missing_source_is_none() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let c = candidate("OL1W", "fr");
        assert!(store.clone_language_row(999, &c).unwrap().is_none());
    }

    #[test]
    fn ratings_and_reading_log_updates_apply() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        store.insert_or_merge(&[book("Dune", "OL1W")]).unwrap();
        let stored = store.book_by_language_slug("en", "dune").unwrap().unwrap();

        store
            .apply_ratings(&[(stored.book_id, 3, 4.0)])
            .unwrap();
        store
            .apply_reading_log(&[(
                stored.book_id,
                ShelfCounts {
                    want: 2,
                    reading: 0,
                    read: 1,
                },
            )])
            .unwrap();

        let updated = store.book_by_id(stored.book_id).unwrap().unwrap();
        assert_eq!(updated.ol_rating_count, 3);
        assert_eq!(updated.ol_avg_rating, Some(4.0));
        assert_eq!(updated.ol_want_to_read_count, 2);
        assert_eq!(updated.ol_currently_reading_count, 0);
        assert_eq!(updated.ol_already_read_count, 1);
    }

    #[test]
    fn transaction_primitives_commit_and_roll_back() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        store.begin().unwrap();
        store.upsert_authors(&[author("Kept Author", "OL1A")]).unwrap();
        store.commit().unwrap();

        store.begin().unwrap();
        store
            .upsert_authors(&[author("Discarded Author", "OL2A")])
            .unwrap();
        store.rollback();

        assert_eq!(store.count_authors().unwrap(), 1);
        assert!(store.author_by_slug("kept-author").unwrap().is_some());
        assert!(store.author_by_slug("discarded-author").unwrap().is_none());
    }
}
