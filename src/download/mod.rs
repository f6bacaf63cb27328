//! Download orchestration.
//!
//! A [`Downloader`] owns one logged-in [`Session`] and turns share links into
//! files on disk. Single-file links go through [`Downloader::download_url`]
//! directly; folder links are scanned, filtered and downloaded concurrently.
//! Per-file problems never abort sibling downloads: each file yields a
//! [`DownloadOutcome`].

mod file;
mod folder;
mod stream;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

pub use stream::{decrypt_stream, ChunkReader, StreamReport};

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::filter::Filter;
use crate::hooks::{AfterScanHook, BeforeDownloadHook};
use crate::progress::{ProgressCallback, TransferProgress};
use crate::session::Session;
use crate::url::parse_url;

/// Everything needed to stream and decrypt one file.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadParams {
    pub index: usize,
    pub direct_url: String,
    pub output_path: PathBuf,
    pub file_size: u64,
    pub iv: [u32; 4],
    pub meta_mac: [u32; 2],
    pub cipher_key: [u32; 4],
}

/// Final state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Written in full and verified.
    Completed,
    /// Written, but shorter than announced.
    Incomplete,
    /// Zero-length placeholder created.
    Touched,
    /// Left alone (skip mode or declined overwrite).
    Skipped,
    /// Excluded by a filter or by the user.
    Filtered,
    /// Stopped by the abort flag.
    Aborted,
    /// Content MAC did not match.
    IntegrityFailed,
    Failed(String),
}

impl DownloadStatus {
    /// Whether the file counts as successfully handled.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed
                | DownloadStatus::Touched
                | DownloadStatus::Skipped
                | DownloadStatus::Filtered
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Completed => f.write_str("completed"),
            DownloadStatus::Incomplete => f.write_str("incomplete"),
            DownloadStatus::Touched => f.write_str("touched"),
            DownloadStatus::Skipped => f.write_str("skipped"),
            DownloadStatus::Filtered => f.write_str("filtered"),
            DownloadStatus::Aborted => f.write_str("aborted"),
            DownloadStatus::IntegrityFailed => f.write_str("integrity check failed"),
            DownloadStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result entry for one file, in request order.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub index: usize,
    pub path: PathBuf,
    pub status: DownloadStatus,
}

impl DownloadOutcome {
    pub fn new(index: usize, path: impl Into<PathBuf>, status: DownloadStatus) -> Self {
        Self {
            index,
            path: path.into(),
            status,
        }
    }
}

/// Interactive decisions the orchestrator may need.
pub trait Decider: Send + Sync {
    /// An output file exists already; overwrite it?
    fn confirm_overwrite(&self, path: &Path, existing_size: u64, expected_size: u64) -> bool;

    /// Unfiltered folder scan: download this file?
    fn confirm_download(&self, index: usize, path: &Path, size: u64) -> bool;
}

/// Fixed answers, for headless runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct AutoDecision {
    pub overwrite: bool,
    pub download: bool,
}

impl Default for AutoDecision {
    fn default() -> Self {
        Self {
            overwrite: false,
            download: true,
        }
    }
}

impl Decider for AutoDecision {
    fn confirm_overwrite(&self, _path: &Path, _existing_size: u64, _expected_size: u64) -> bool {
        self.overwrite
    }

    fn confirm_download(&self, _index: usize, _path: &Path, _size: u64) -> bool {
        self.download
    }
}

/// Share link downloader.
pub struct Downloader {
    session: Session,
    config: Config,
    filters: Vec<Box<dyn Filter>>,
    before_hooks: Vec<Arc<dyn BeforeDownloadHook>>,
    after_hooks: Vec<Arc<dyn AfterScanHook>>,
    decider: Arc<dyn Decider>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader")
            .field("session", &self.session)
            .field("filters", &self.filters.len())
            .field("before_hooks", &self.before_hooks.len())
            .field("after_hooks", &self.after_hooks.len())
            .finish()
    }
}

impl Downloader {
    /// Build the protocol client and log in anonymously.
    pub async fn connect(config: Config, abort: Arc<AtomicBool>) -> Result<Self> {
        config.validate()?;
        let api = ApiClient::new(&config, abort)?;
        let session = Session::login_anonymous(api).await?;
        Self::new(session, config)
    }

    /// Wrap an existing session; filters come from the configuration.
    pub fn new(session: Session, config: Config) -> Result<Self> {
        let filters = config.build_filters()?;
        Ok(Self {
            session,
            config,
            filters,
            before_hooks: Vec::new(),
            after_hooks: Vec::new(),
            decider: Arc::new(AutoDecision::default()),
            progress: None,
        })
    }

    pub fn with_filter(mut self, filter: Box<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_before_download_hook(mut self, hook: Arc<dyn BeforeDownloadHook>) -> Self {
        self.before_hooks.push(hook);
        self
    }

    pub fn with_after_scan_hook(mut self, hook: Arc<dyn AfterScanHook>) -> Self {
        self.after_hooks.push(hook);
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Raise the shared abort flag.
    pub fn abort(&self) {
        self.session.api().abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.session.api().is_aborted()
    }

    fn report(&self, progress: TransferProgress) {
        if let Some(sink) = &self.progress {
            if !sink(&progress) {
                self.abort();
            }
        }
    }

    /// Download everything a share link points at.
    ///
    /// Fails only for malformed links and scan-time protocol errors; per-file
    /// problems are reported in the outcomes.
    pub async fn download_url(&self, url: &str) -> Result<Vec<DownloadOutcome>> {
        let parsed = parse_url(url)?;
        if parsed.is_folder() {
            info!("Processing folder {}...", parsed.folder_id);
            if let Some(pinned) = parsed.pinned_file() {
                info!("Pre-selected file {}...", pinned);
            }
            self.download_folder(url, &parsed).await
        } else {
            info!("Processing file {}...", parsed.file_id);
            Ok(vec![self.download_file(url, &parsed).await?])
        }
    }
}
