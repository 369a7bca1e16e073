//! Tests for run coordination: the process-wide run lock, trigger
//! rejection, failure cleanup, status publishing, and phase-level resume.

use alexandria::config::DumpConfig;
use alexandria::orchestrator::{Importer, RunLock, TriggerOutcome};
use alexandria::runstate::{self, RunState};
use alexandria::store::CatalogStore;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn write_gz(dir: &Path, name: &str, lines: &[String]) {
    let file = std::fs::File::create(dir.join(name)).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::fast());
    for line in lines {
        writeln!(encoder, "{line}").unwrap();
    }
    encoder.finish().unwrap();
}

fn tagged(tag: &str, key_path: &str, data: &serde_json::Value) -> String {
    format!("{tag}\t{key_path}\t1\t2024-01-01T00:00:00\t{data}")
}

fn minimal_author_lines() -> Vec<String> {
    vec![tagged(
        "/type/author",
        "/authors/OL1A",
        &json!({"name": "Frank Herbert", "key": "/authors/OL1A"}),
    )]
}

fn minimal_work_lines() -> Vec<String> {
    vec![tagged(
        "/type/work",
        "/works/OL1W",
        &json!({"title": "Dune", "key": "/works/OL1W"}),
    )]
}

fn empty_lines() -> Vec<String> {
    Vec::new()
}

/// The full fixture set with trivially small contents.
fn write_minimal_fixtures(dir: &Path) {
    write_gz(dir, "ol_dump_authors_latest.txt.gz", &minimal_author_lines());
    write_gz(dir, "ol_dump_wikidata_latest.txt.gz", &empty_lines());
    write_gz(dir, "ol_dump_works_latest.txt.gz", &minimal_work_lines());
    write_gz(dir, "ol_dump_editions_latest.txt.gz", &empty_lines());
    write_gz(dir, "ol_dump_ratings_latest.txt.gz", &empty_lines());
    write_gz(dir, "ol_dump_reading-log_latest.txt.gz", &empty_lines());
}

fn test_config(fixtures: &TempDir, tmp: &TempDir) -> DumpConfig {
    DumpConfig {
        base_url: format!("file://{}", fixtures.path().display()),
        tmp_dir: tmp.path().to_path_buf(),
        ..DumpConfig::default()
    }
}

fn dump_files_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|name| name.starts_with("ol_dump_"))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn trigger_while_running_is_rejected_without_side_effects() {
    let fixtures = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();
    write_minimal_fixtures(fixtures.path());

    let importer = Importer::new(test_config(&fixtures, &tmp), RunLock::new());

    // another run holds the marker
    assert!(importer
        .lock()
        .try_acquire("running-job", Duration::from_secs(600)));

    let store = CatalogStore::open_in_memory().unwrap();
    match importer.trigger(store, false) {
        TriggerOutcome::AlreadyRunning => {}
        TriggerOutcome::Started(_) => panic!("trigger must be rejected while a run is active"),
    }

    // no second marker, and no download was started
    assert_eq!(importer.lock().active_job().as_deref(), Some("running-job"));
    assert!(dump_files_in(tmp.path()).is_empty());
}

#[tokio::test]
async fn triggered_run_completes_and_releases_the_lock() {
    let fixtures = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();
    write_minimal_fixtures(fixtures.path());

    let importer = Importer::new(test_config(&fixtures, &tmp), RunLock::new());
    let store = CatalogStore::open_in_memory().unwrap();

    let handle = match importer.trigger(store, false) {
        TriggerOutcome::Started(handle) => handle,
        TriggerOutcome::AlreadyRunning => panic!("nothing else is running"),
    };

    // the marker is held from the moment trigger returns, so a second
    // trigger is deterministically rejected
    let second_store = CatalogStore::open_in_memory().unwrap();
    assert!(matches!(
        importer.trigger(second_store, false),
        TriggerOutcome::AlreadyRunning
    ));

    let summary = handle.task.await.unwrap().unwrap();
    assert_eq!(summary.job_id, handle.job_id);
    assert!(summary.text.starts_with("Complete:"));

    assert!(!importer.lock().is_active());
    assert_eq!(
        importer.status(&handle.job_id).unwrap().as_deref(),
        Some(summary.text.as_str())
    );
}

#[tokio::test]
async fn failed_run_cleans_all_temp_files_and_releases_the_lock() {
    let fixtures = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();
    // works dump missing: phase 3's download fails after phases 1-2 ran
    write_gz(
        fixtures.path(),
        "ol_dump_authors_latest.txt.gz",
        &minimal_author_lines(),
    );
    write_gz(
        fixtures.path(),
        "ol_dump_wikidata_latest.txt.gz",
        &empty_lines(),
    );

    let importer = Importer::new(test_config(&fixtures, &tmp), RunLock::new());
    let mut store = CatalogStore::open_in_memory().unwrap();

    let result = importer.run(&mut store, false).await;
    assert!(result.is_err());

    // cleanup ran for every phase, not just the failed one
    assert!(dump_files_in(tmp.path()).is_empty());
    // the marker is released
    assert!(!importer.lock().is_active());
    // the failure text is visible to status queries
    let status = importer.latest_status().unwrap().unwrap();
    assert!(status.starts_with("Failed:"), "status was: {status}");

    // phase 1 still landed before the failure
    assert_eq!(store.count_authors().unwrap(), 1);
}

#[tokio::test]
async fn resume_skips_completed_phases_and_keeps_the_job_id() {
    let fixtures = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();
    // only the dumps for phases 3-6 exist; resuming past 1-2 must not ask
    // for the others
    write_gz(
        fixtures.path(),
        "ol_dump_works_latest.txt.gz",
        &minimal_work_lines(),
    );
    write_gz(
        fixtures.path(),
        "ol_dump_editions_latest.txt.gz",
        &empty_lines(),
    );
    write_gz(
        fixtures.path(),
        "ol_dump_ratings_latest.txt.gz",
        &empty_lines(),
    );
    write_gz(
        fixtures.path(),
        "ol_dump_reading-log_latest.txt.gz",
        &empty_lines(),
    );

    let mut interrupted = RunState::new("interrupted-job");
    interrupted.mark_completed(1);
    interrupted.mark_completed(2);
    runstate::save(tmp.path(), &interrupted).unwrap();

    let importer = Importer::new(test_config(&fixtures, &tmp), RunLock::new());
    let mut store = CatalogStore::open_in_memory().unwrap();

    let summary = importer.run(&mut store, true).await.unwrap().unwrap();
    assert_eq!(summary.job_id, "interrupted-job");
    // phases 1-2 did not run again, so they contribute nothing
    assert!(summary.reports.authors.is_none());
    assert!(summary.reports.wikidata.is_none());
    assert!(summary.reports.works.is_some());
    assert_eq!(store.count_books().unwrap(), 1);
}

#[tokio::test]
async fn finished_state_is_not_resumed() {
    let fixtures = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();
    write_minimal_fixtures(fixtures.path());

    let mut finished = RunState::new("finished-job");
    for phase in 1..=6 {
        finished.mark_completed(phase);
    }
    finished.finished = true;
    runstate::save(tmp.path(), &finished).unwrap();

    let importer = Importer::new(test_config(&fixtures, &tmp), RunLock::new());
    let mut store = CatalogStore::open_in_memory().unwrap();

    // a resume request over a finished state starts a fresh run
    let summary = importer.run(&mut store, true).await.unwrap().unwrap();
    assert_ne!(summary.job_id, "finished-job");
    assert!(summary.reports.authors.is_some());
    assert_eq!(store.count_authors().unwrap(), 1);
}
