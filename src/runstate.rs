//! Persisted run state: which phases of a run have completed, their reports,
//! and the human-readable progress string. Saved atomically (temp file +
//! rename) after every transition so an interrupted run can resume and an
//! external status query can answer at any time. State expires after seven
//! days; the progress string expires after 24 hours.

use crate::config::{RUN_STATE_TTL_SECS, RUN_STATE_VERSION, STATUS_TTL_SECS};
use crate::models::PhaseReports;
use anyhow::{Context, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

#[derive(Serialize, Deserialize, Clone)]
pub struct RunState {
    pub version: u32,
    pub job_id: String,
    pub started_at_unix: u64,
    pub completed_phases: Vec<u8>,
    pub reports: PhaseReports,
    pub status: String,
    pub status_updated_unix: u64,
    /// Set when all phases have run; finished states are not resumed.
    pub finished: bool,
}

impl RunState {
    pub fn new(job_id: &str) -> Self {
        let now = now_unix();
        Self {
            version: RUN_STATE_VERSION,
            job_id: job_id.to_string(),
            started_at_unix: now,
            completed_phases: Vec::new(),
            reports: PhaseReports::default(),
            status: String::new(),
            status_updated_unix: now,
            finished: false,
        }
    }

    pub fn is_completed(&self, phase: u8) -> bool {
        self.completed_phases.contains(&phase)
    }

    pub fn mark_completed(&mut self, phase: u8) {
        if !self.completed_phases.contains(&phase) {
            self.completed_phases.push(phase);
            self.completed_phases.sort_unstable();
        }
    }

    pub fn set_status(&mut self, status: String) {
        self.status = status;
        self.status_updated_unix = now_unix();
    }

    /// The progress string, unless it has passed its 24-hour expiry.
    pub fn status_if_fresh(&self) -> Option<&str> {
        if self.status.is_empty() {
            return None;
        }
        if now_unix().saturating_sub(self.status_updated_unix) > STATUS_TTL_SECS {
            return None;
        }
        Some(&self.status)
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn state_path(dir: &Path) -> PathBuf {
    dir.join("import_state.bin")
}

pub fn save(dir: &Path, state: &RunState) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create state directory: {}", dir.display()))?;

    let path = state_path(dir);
    let tmp_path = path.with_extension("bin.tmp");
    let file = File::create(&tmp_path)
        .with_context(|| format!("failed to create temp state file: {}", tmp_path.display()))?;
    let writer = BufWriter::new(file);

    bincode::DefaultOptions::new()
        .serialize_into(writer, state)
        .context("failed to serialize run state")?;

    fs::rename(&tmp_path, &path)
        .with_context(|| format!("failed to rename temp state file: {}", path.display()))?;
    Ok(())
}

/// Returns `Ok(Some(state))` when a valid, unexpired state file exists.
/// Corrupt, stale, or version-mismatched files read as absent.
pub fn load_if_valid(dir: &Path) -> Result<Option<RunState>> {
    let path = state_path(dir);
    if !path.exists() {
        return Ok(None);
    }

    let file_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    let file = File::open(&path).context("failed to open state file")?;
    let reader = BufReader::new(file);

    let options = bincode::options().with_limit(file_size.saturating_add(1024));
    let state: RunState = match options.deserialize_from(reader) {
        Ok(state) => state,
        Err(e) => {
            warn!(error = %e, "run state file is corrupt or unreadable");
            return Ok(None);
        }
    };

    if state.version != RUN_STATE_VERSION {
        info!(
            cached = state.version,
            current = RUN_STATE_VERSION,
            "run state version mismatch"
        );
        return Ok(None);
    }

    if now_unix().saturating_sub(state.started_at_unix) > RUN_STATE_TTL_SECS {
        info!(job_id = %state.job_id, "run state expired");
        return Ok(None);
    }

    Ok(Some(state))
}

pub fn clear(dir: &Path) -> Result<()> {
    let path = state_path(dir);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove state file: {}", path.display()))?;
    }
    Ok(())
}
