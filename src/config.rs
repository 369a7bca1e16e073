use std::path::PathBuf;
use std::time::Duration;

/// Capacity of the decode-thread to consumer channel, in batches
pub const CHANNEL_CAPACITY: usize = 100;

/// Records per batch for the author/work dumps
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Records per batch for the (much larger) editions dump
pub const DEFAULT_EDITION_BATCH_SIZE: usize = 1000;

/// Commit after this many processed records in Phases 1-3
pub const DEFAULT_COMMIT_INTERVAL: u64 = 10_000;

/// Alternate names stored per author
pub const MAX_ALTERNATE_NAMES: usize = 20;

/// Genre tags derived per work
pub const MAX_GENRES_PER_WORK: usize = 5;

/// ISBNs stored per book row
pub const MAX_ISBNS_PER_BOOK: usize = 20;

/// Edition updates applied per commit during the post-scan flush
pub const UPDATE_CHUNK_SIZE: usize = 500;

/// Book rows updated per commit in the ratings/reading-log phases
pub const AGGREGATE_CHUNK_SIZE: usize = 1000;

pub const DOWNLOAD_MAX_RETRIES: u32 = 5;
pub const DOWNLOAD_CONNECT_TIMEOUT_SECS: u64 = 60;
pub const DOWNLOAD_READ_TIMEOUT_SECS: u64 = 300;
pub const DOWNLOAD_BACKOFF_BASE_SECS: u64 = 30;
pub const DOWNLOAD_BACKOFF_CAP_SECS: u64 = 300;
/// Log download progress every 100 MB
pub const DOWNLOAD_LOG_EVERY_BYTES: u64 = 100 * 1024 * 1024;

/// Expiry of the process-wide "import running" marker
pub const RUN_LOCK_TTL_SECS: u64 = 86_400;

/// Expiry of the published progress string
pub const STATUS_TTL_SECS: u64 = 86_400;

/// Expiry of the persisted run state (resume window)
pub const RUN_STATE_TTL_SECS: u64 = 604_800;

pub const RUN_STATE_VERSION: u32 = 1;

pub const MAX_NAME_LEN: usize = 300;
pub const MAX_TITLE_LEN: usize = 500;
pub const MAX_PUBLISHER_LEN: usize = 500;
pub const MAX_URL_LEN: usize = 1000;
pub const MAX_SLUG_LEN: usize = 200;
pub const MAX_GENRE_NAME_LEN: usize = 100;
pub const MAX_GENRE_SLUG_LEN: usize = 150;
pub const MAX_NATIONALITY_LEN: usize = 200;
pub const MAX_BIRTH_PLACE_LEN: usize = 500;

pub const DEFAULT_DUMP_BASE_URL: &str = "https://openlibrary.org/data";

/// Runtime configuration for one import run.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    /// Base URL the six "latest" dump files are fetched from
    pub base_url: String,
    /// Directory for downloaded dump files and the persisted run state
    pub tmp_dir: PathBuf,
    pub batch_size: usize,
    pub edition_batch_size: usize,
    pub commit_interval: u64,
    pub wikidata_enabled: bool,
    pub editions_enabled: bool,
    pub ratings_enabled: bool,
    pub reading_log_enabled: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub download_max_retries: u32,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DUMP_BASE_URL.to_string(),
            tmp_dir: std::env::temp_dir().join("alexandria"),
            batch_size: DEFAULT_BATCH_SIZE,
            edition_batch_size: DEFAULT_EDITION_BATCH_SIZE,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            wikidata_enabled: true,
            editions_enabled: true,
            ratings_enabled: true,
            reading_log_enabled: true,
            connect_timeout: Duration::from_secs(DOWNLOAD_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DOWNLOAD_READ_TIMEOUT_SECS),
            download_max_retries: DOWNLOAD_MAX_RETRIES,
        }
    }
}

impl DumpConfig {
    pub fn dump_url(&self, remote_name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), remote_name)
    }
}
