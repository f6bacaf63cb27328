//! Progress reporting for downloads.

use std::sync::Arc;

/// Progress of one file download.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Position of the file in the download queue
    pub index: usize,
    /// Bytes transferred so far
    pub done: u64,
    /// Total bytes to transfer
    pub total: u64,
    /// Name of the file being transferred
    pub filename: String,
}

impl TransferProgress {
    /// Create a new progress report.
    pub fn new(index: usize, done: u64, total: u64, filename: impl Into<String>) -> Self {
        Self {
            index,
            done,
            total,
            filename: filename.into(),
        }
    }

    /// Get progress as a percentage (0.0 to 100.0).
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.done as f64 / self.total as f64) * 100.0
    }

    /// Check if transfer is complete.
    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}

/// Progress sink shared by concurrent downloads.
///
/// Returning `false` raises the abort flag.
pub type ProgressCallback = Arc<dyn Fn(&TransferProgress) -> bool + Send + Sync>;
