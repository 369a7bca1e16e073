//! Alexandria: Open Library dump ingestion and catalog import pipeline
//!
//! This crate downloads the public Open Library bulk data dumps and reconciles
//! them into a multilingual book/author catalog through six sequential phases:
//!
//! 1. **Authors** -- Upsert author rows keyed by slug, filling missing fields
//!    without overwriting existing data
//! 2. **Wikidata** (optional) -- Enrich authors with nationality, birth place,
//!    and Wikipedia URLs cross-referenced by Wikidata id
//! 3. **Works** -- Insert English-language book rows with author and genre
//!    relations resolved through an in-memory author map
//! 4. **Editions** (optional) -- Pick the best edition per (work, language),
//!    merge its fields into existing rows, and clone English rows into new
//!    language variants
//! 5. **Ratings** (optional) -- Aggregate the ratings dump and apply count and
//!    average to every language row of each work
//! 6. **Reading log** (optional) -- Aggregate shelf counters the same way
//!
//! # Architecture
//!
//! The pipeline is designed for bounded memory over multi-gigabyte inputs:
//!
//! - **Streaming decode** -- Dumps are gunzipped line by line on a dedicated
//!   worker thread; nothing is ever fully loaded
//! - **Bounded batching** -- Decoded record batches cross to the async
//!   consumer through a capacity-limited channel; a slow consumer blocks the
//!   decoder instead of growing a buffer
//! - **Best-effort parsing** -- Malformed lines are skipped and counted, never
//!   fatal
//! - **Conflict-safe upserts** -- Authors merge by slug, books by
//!   (language, slug), with fill-if-null semantics on enrichment fields
//! - **Resumable runs** -- Completed phases are checkpointed so an
//!   interrupted import can continue where it stopped
//!
//! # Key Modules
//!
//! - [`reader`] -- Streaming gzip dump reader with the decode-thread bridge
//! - [`download`] -- Resumable HTTP download of dump files
//! - [`store`] -- SQLite catalog store (upserts, lookups, relation copies)
//! - [`lookup`] -- Author and book lookup maps rebuilt between phases
//! - [`authors`], [`wikidata`], [`works`], [`editions`], [`ratings`],
//!   [`reading_log`] -- The six phase processors
//! - [`orchestrator`] -- Phase sequencing, run lock, status publishing
//! - [`runstate`] -- Persisted run progress with expiry
//! - [`lang`] -- MARC-3 to ISO-639-1 language table
//! - [`normalize`] -- Slugs, free-text dates, description cleanup, series
//! - [`fields`] -- Open Library JSON field extraction
//! - [`models`] -- Row, candidate, and report types
//! - [`config`] -- Tuning constants and runtime configuration

pub mod authors;
pub mod config;
pub mod download;
pub mod editions;
pub mod fields;
pub mod lang;
pub mod lookup;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod ratings;
pub mod reader;
pub mod reading_log;
pub mod runstate;
pub mod store;
pub mod wikidata;
pub mod works;
