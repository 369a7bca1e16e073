//! Run orchestration: sequences the six phases, owns the process-wide run
//! lock, publishes progress strings, and guarantees that downloaded dump
//! files for every phase are removed whatever the outcome.
//!
//! A run moves strictly through download -> process for each phase; phases
//! never overlap and at most one run exists system-wide. Background workers
//! hold a clone of [`RunLock`] and skip their own cycle while it is active.

use crate::authors;
use crate::config::{DumpConfig, RUN_LOCK_TTL_SECS};
use crate::download;
use crate::editions;
use crate::lookup::{AuthorMap, BookMap};
use crate::models::PhaseReports;
use crate::ratings;
use crate::reading_log;
use crate::runstate::{self, RunState};
use crate::store::CatalogStore;
use crate::wikidata;
use crate::works;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct PhaseFile {
    number: u8,
    label: &'static str,
    remote: &'static str,
    local: &'static str,
}

const PHASES: [PhaseFile; 6] = [
    PhaseFile {
        number: 1,
        label: "authors",
        remote: "ol_dump_authors_latest.txt.gz",
        local: "ol_dump_authors.txt.gz",
    },
    PhaseFile {
        number: 2,
        label: "wikidata",
        remote: "ol_dump_wikidata_latest.txt.gz",
        local: "ol_dump_wikidata.txt.gz",
    },
    PhaseFile {
        number: 3,
        label: "works",
        remote: "ol_dump_works_latest.txt.gz",
        local: "ol_dump_works.txt.gz",
    },
    PhaseFile {
        number: 4,
        label: "editions",
        remote: "ol_dump_editions_latest.txt.gz",
        local: "ol_dump_editions.txt.gz",
    },
    PhaseFile {
        number: 5,
        label: "ratings",
        remote: "ol_dump_ratings_latest.txt.gz",
        local: "ol_dump_ratings.txt.gz",
    },
    PhaseFile {
        number: 6,
        label: "reading log",
        remote: "ol_dump_reading-log_latest.txt.gz",
        local: "ol_dump_reading_log.txt.gz",
    },
];

struct Marker {
    job_id: String,
    expires_at: Instant,
}

/// Process-wide "import running" marker with expiry. The importer acquires
/// it for the duration of a run; the continuous-fetch and catalog-cleanup
/// workers check it before starting their own cycle.
#[derive(Clone, Default)]
pub struct RunLock {
    inner: Arc<Mutex<Option<Marker>>>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the marker unless an unexpired holder exists.
    pub fn try_acquire(&self, job_id: &str, ttl: Duration) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(marker) if marker.expires_at > Instant::now() => false,
            _ => {
                *guard = Some(Marker {
                    job_id: job_id.to_string(),
                    expires_at: Instant::now() + ttl,
                });
                true
            }
        }
    }

    pub fn release(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    /// Job id of the unexpired holder, if any.
    pub fn active_job(&self) -> Option<String> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|marker| marker.expires_at > Instant::now())
            .map(|marker| marker.job_id.clone())
    }

    pub fn is_active(&self) -> bool {
        self.active_job().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub job_id: String,
    pub reports: PhaseReports,
    pub text: String,
}

/// A run started by [`Importer::trigger`], proceeding asynchronously.
pub struct RunHandle {
    pub job_id: String,
    pub task: JoinHandle<Result<ImportSummary>>,
}

pub enum TriggerOutcome {
    Started(RunHandle),
    AlreadyRunning,
}

pub struct Importer {
    config: DumpConfig,
    lock: RunLock,
}

impl Importer {
    pub fn new(config: DumpConfig, lock: RunLock) -> Self {
        Self { config, lock }
    }

    pub fn config(&self) -> &DumpConfig {
        &self.config
    }

    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    /// Starts a run unless one is already active. The marker is acquired
    /// before anything else happens, so a rejected trigger has started no
    /// download and left no second marker behind.
    pub fn trigger(&self, mut store: CatalogStore, resume: bool) -> TriggerOutcome {
        let job_id = uuid::Uuid::new_v4().to_string();
        if !self
            .lock
            .try_acquire(&job_id, Duration::from_secs(RUN_LOCK_TTL_SECS))
        {
            return TriggerOutcome::AlreadyRunning;
        }

        let config = self.config.clone();
        let lock = self.lock.clone();
        let task_job_id = job_id.clone();
        let task = tokio::spawn(async move {
            run_locked(task_job_id, config, &mut store, lock, resume).await
        });
        TriggerOutcome::Started(RunHandle { job_id, task })
    }

    /// Runs to completion on the calling task; `Ok(None)` when another run
    /// holds the marker.
    pub async fn run(
        &self,
        store: &mut CatalogStore,
        resume: bool,
    ) -> Result<Option<ImportSummary>> {
        let job_id = uuid::Uuid::new_v4().to_string();
        if !self
            .lock
            .try_acquire(&job_id, Duration::from_secs(RUN_LOCK_TTL_SECS))
        {
            return Ok(None);
        }
        run_locked(job_id, self.config.clone(), store, self.lock.clone(), resume)
            .await
            .map(Some)
    }

    /// Progress string for a specific job id, honoring the 24-hour expiry.
    pub fn status(&self, job_id: &str) -> Result<Option<String>> {
        Ok(runstate::load_if_valid(&self.config.tmp_dir)?
            .filter(|state| state.job_id == job_id)
            .and_then(|state| state.status_if_fresh().map(str::to_string)))
    }

    /// Progress string of the most recent run, whichever job it belongs to.
    pub fn latest_status(&self) -> Result<Option<String>> {
        Ok(runstate::load_if_valid(&self.config.tmp_dir)?
            .and_then(|state| state.status_if_fresh().map(str::to_string)))
    }
}

async fn run_locked(
    job_id: String,
    config: DumpConfig,
    store: &mut CatalogStore,
    lock: RunLock,
    resume: bool,
) -> Result<ImportSummary> {
    let result = run_phases(&job_id, &config, store, resume).await;

    // cleanup always runs, for every phase's file, whatever happened
    for phase_file in &PHASES {
        let _ = std::fs::remove_file(config.tmp_dir.join(phase_file.local));
    }
    lock.release();

    match result {
        Ok(summary) => {
            info!(job_id = %summary.job_id, "import complete");
            Ok(summary)
        }
        Err(e) => {
            error!(error = %e, job_id = %job_id, "import failed");
            publish_failure(&config, &job_id, &e);
            Err(e)
        }
    }
}

/// Best effort: the failure text must be visible to status queries even when
/// the run state itself cannot be read back.
fn publish_failure(config: &DumpConfig, job_id: &str, e: &anyhow::Error) {
    let mut state = runstate::load_if_valid(&config.tmp_dir)
        .ok()
        .flatten()
        .filter(|state| state.job_id == job_id)
        .unwrap_or_else(|| RunState::new(job_id));
    state.set_status(format!("Failed: {e:#}"));
    if let Err(save_err) = runstate::save(&config.tmp_dir, &state) {
        warn!(error = %save_err, "failed to persist failure status");
    }
}

async fn run_phases(
    job_id: &str,
    config: &DumpConfig,
    store: &mut CatalogStore,
    resume: bool,
) -> Result<ImportSummary> {
    std::fs::create_dir_all(&config.tmp_dir).with_context(|| {
        format!(
            "failed to create dump directory: {}",
            config.tmp_dir.display()
        )
    })?;

    // a resumed run keeps its original job id and completed phases
    let mut state = match runstate::load_if_valid(&config.tmp_dir)? {
        Some(prev) if resume && !prev.finished => {
            info!(
                job_id = %prev.job_id,
                completed = ?prev.completed_phases,
                "resuming import run"
            );
            prev
        }
        _ => RunState::new(job_id),
    };
    runstate::save(&config.tmp_dir, &state)?;

    let client = download::client(config)?;

    // --- Phase 1: authors ---
    if !state.is_completed(1) {
        let dest = fetch_phase(&client, config, &mut state, 0).await?;
        set_status(config, &mut state, "Phase 1/6: processing authors")?;
        let report = authors::run(&dest, store, config).await?;
        state.reports.authors = Some(report);
        finish_phase(config, &mut state, 1)?;
    } else {
        info!("phase 1 (authors) already completed, skipping");
    }

    // --- Phase 2: wikidata ---
    if !state.is_completed(2) {
        if config.wikidata_enabled {
            let dest = fetch_phase(&client, config, &mut state, 1).await?;
            set_status(config, &mut state, "Phase 2/6: processing wikidata")?;
            let report = wikidata::run(&dest, store, config).await?;
            state.reports.wikidata = Some(report);
            finish_phase(config, &mut state, 2)?;
        } else {
            info!("phase 2 skipped (wikidata disabled)");
            finish_phase(config, &mut state, 2)?;
        }
    } else {
        info!("phase 2 (wikidata) already completed, skipping");
    }

    // --- Phase 3: works ---
    if !state.is_completed(3) {
        let dest = fetch_phase(&client, config, &mut state, 2).await?;
        let author_map = AuthorMap::build(store)?;
        set_status(config, &mut state, "Phase 3/6: processing works")?;
        let report = works::run(&dest, store, &author_map, config).await?;
        state.reports.works = Some(report);
        finish_phase(config, &mut state, 3)?;
    } else {
        info!("phase 3 (works) already completed, skipping");
    }

    // The book map serves phases 4-6; build it once, after works landed.
    let needs_book_map = (!state.is_completed(4) && config.editions_enabled)
        || (!state.is_completed(5) && config.ratings_enabled)
        || (!state.is_completed(6) && config.reading_log_enabled);
    let mut book_map = if needs_book_map {
        Some(BookMap::build(store)?)
    } else {
        None
    };

    // --- Phase 4: editions ---
    if !state.is_completed(4) {
        if config.editions_enabled {
            let map = book_map.as_mut().context("book map not built")?;
            let dest = fetch_phase(&client, config, &mut state, 3).await?;
            set_status(config, &mut state, "Phase 4/6: processing editions")?;
            let report = editions::run(&dest, store, map, config).await?;
            state.reports.editions = Some(report);
            finish_phase(config, &mut state, 4)?;
        } else {
            info!("phase 4 skipped (editions disabled)");
            finish_phase(config, &mut state, 4)?;
        }
    } else {
        info!("phase 4 (editions) already completed, skipping");
    }

    // --- Phase 5: ratings ---
    if !state.is_completed(5) {
        if config.ratings_enabled {
            let map = book_map.as_ref().context("book map not built")?;
            let dest = fetch_phase(&client, config, &mut state, 4).await?;
            set_status(config, &mut state, "Phase 5/6: processing ratings")?;
            let report = ratings::run(&dest, store, map).await?;
            state.reports.ratings = Some(report);
            finish_phase(config, &mut state, 5)?;
        } else {
            info!("phase 5 skipped (ratings disabled)");
            finish_phase(config, &mut state, 5)?;
        }
    } else {
        info!("phase 5 (ratings) already completed, skipping");
    }

    // --- Phase 6: reading log ---
    if !state.is_completed(6) {
        if config.reading_log_enabled {
            let map = book_map.as_ref().context("book map not built")?;
            let dest = fetch_phase(&client, config, &mut state, 5).await?;
            set_status(config, &mut state, "Phase 6/6: processing reading log")?;
            let report = reading_log::run(&dest, store, map).await?;
            state.reports.reading_log = Some(report);
            finish_phase(config, &mut state, 6)?;
        } else {
            info!("phase 6 skipped (reading log disabled)");
            finish_phase(config, &mut state, 6)?;
        }
    } else {
        info!("phase 6 (reading log) already completed, skipping");
    }

    let text = state.reports.summary();
    state.finished = true;
    set_status(config, &mut state, &text)?;

    Ok(ImportSummary {
        job_id: state.job_id.clone(),
        reports: state.reports,
        text,
    })
}

/// Publishes the downloading status and fetches one phase's dump file.
async fn fetch_phase(
    client: &reqwest::Client,
    config: &DumpConfig,
    state: &mut RunState,
    index: usize,
) -> Result<PathBuf> {
    let phase_file = &PHASES[index];
    set_status(
        config,
        state,
        &format!("Phase {}/6: downloading {} dump", phase_file.number, phase_file.label),
    )?;
    let dest = config.tmp_dir.join(phase_file.local);
    download::fetch(client, &config.dump_url(phase_file.remote), &dest, config).await?;
    Ok(dest)
}

fn set_status(config: &DumpConfig, state: &mut RunState, status: &str) -> Result<()> {
    info!(status, "import status");
    state.set_status(status.to_string());
    runstate::save(&config.tmp_dir, state)
}

/// Marks a phase done, persists the state, and deletes that phase's dump
/// file right away rather than holding disk for the whole run.
fn finish_phase(config: &DumpConfig, state: &mut RunState, phase: u8) -> Result<()> {
    state.mark_completed(phase);
    runstate::save(&config.tmp_dir, state)?;
    let phase_file = &PHASES[(phase - 1) as usize];
    let _ = std::fs::remove_file(config.tmp_dir.join(phase_file.local));
    Ok(())
}
