//! # megadl
//!
//! Read-only downloader for MEGA public share links.
//!
//! ## Features
//!
//! - **Links**: file links (`/file/<id>#<key>`, legacy `#!<id>!<key>`) and
//!   folder links (`/folder/<id>#<key>`, legacy `#F!<id>!<key>`), including a
//!   pinned `/file/<id>` inside a folder link.
//! - **Session**: anonymous throwaway login with hashcash proof of work,
//!   request pacing and retries with jittered backoff.
//! - **Folders**: node key resolution (own, shared and exported keys), a
//!   sanitized path tree, size/name/extension filters and hooks.
//! - **Transfers**: AES-CTR streaming decryption with chunked CBC-MAC
//!   verification, bounded concurrency, a shared abort flag and progress
//!   callbacks.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! use megadl::{Config, Downloader};
//!
//! # async fn example() -> megadl::Result<()> {
//! let config = Config {
//!     dest_base: "downloads".into(),
//!     max_jobs: 2,
//!     ..Config::default()
//! };
//! let downloader = Downloader::connect(config, Arc::new(AtomicBool::new(false))).await?;
//!
//! for outcome in downloader.download_url("https://mega.nz/folder/abc#key").await? {
//!     println!("{}: {}", outcome.path.display(), outcome.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod base64;
pub mod config;
pub mod crypto;
pub mod download;
pub mod error;
pub mod filter;
pub mod fs;
pub mod hooks;
pub mod http;
pub mod progress;
pub mod session;
pub mod url;

pub use config::{Config, DownloadMode, IntegrityPolicy, OverwritePolicy, Range};
pub use download::{
    AutoDecision, Decider, DownloadOutcome, DownloadParams, DownloadStatus, Downloader,
};
pub use error::{MegaError, Result};
pub use filter::{FileExtFilter, FileNameFilter, FileSizeFilter, Filter};
pub use fs::{Node, NodeType, PathTree};
pub use hooks::{AfterScanHook, BeforeDownloadHook, DumpLinksHook, DumpStructureHook};
pub use progress::{ProgressCallback, TransferProgress};
pub use session::Session;
pub use url::{parse_url, ParsedUrl};
