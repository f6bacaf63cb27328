//! File filters.
//!
//! A filter *matches* a file when it excludes it from download.

use std::fmt;

use crate::config::Range;
use crate::error::{MegaError, Result};
use crate::fs::Node;

const MB: f64 = 1024.0 * 1024.0;

/// Exclusion predicate over resolved files.
pub trait Filter: fmt::Display + Send + Sync {
    /// `true` when the file must be skipped.
    fn matches(&self, file: &Node) -> bool;
}

/// First filter that excludes `file`, if any.
pub fn any_filter_matching<'a>(file: &Node, filters: &'a [Box<dyn Filter>]) -> Option<&'a dyn Filter> {
    filters
        .iter()
        .find(|f| f.matches(file))
        .map(|f| f.as_ref())
}

/// Keeps files whose size in MB lies in `[min, max)`.
#[derive(Debug, Clone)]
pub struct FileSizeFilter {
    range: Range,
}

impl FileSizeFilter {
    pub fn new(range: Range) -> Self {
        Self { range }
    }
}

impl Filter for FileSizeFilter {
    fn matches(&self, file: &Node) -> bool {
        !self.range.contains(file.size as f64 / MB)
    }
}

impl fmt::Display for FileSizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileSizeFilter<{} MB>", self.range)
    }
}

/// Keeps files whose name matches a glob.
#[derive(Debug, Clone)]
pub struct FileNameFilter {
    pattern: glob::Pattern,
}

impl FileNameFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| MegaError::Config(format!("Invalid name pattern '{}': {}", pattern, e)))?;
        Ok(Self { pattern })
    }
}

impl Filter for FileNameFilter {
    fn matches(&self, file: &Node) -> bool {
        !self.pattern.matches(&file.name)
    }
}

impl fmt::Display for FileNameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileNameFilter<{}>", self.pattern)
    }
}

/// Keeps files with one of the listed extensions (case-insensitive).
#[derive(Debug, Clone)]
pub struct FileExtFilter {
    extensions: Vec<String>,
}

impl FileExtFilter {
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }
}

impl Filter for FileExtFilter {
    fn matches(&self, file: &Node) -> bool {
        let ext = match file.name.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => return true,
        };
        !self.extensions.iter().any(|e| *e == ext)
    }
}

impl fmt::Display for FileExtFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileExtFilter<{}>", self.extensions.join(","))
    }
}
