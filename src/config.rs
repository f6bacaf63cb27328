//! Download configuration.
//!
//! A [`Config`] is built once (defaults, then an optional TOML file, then
//! command-line overrides) and handed by reference to the protocol client and
//! the download orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MegaError, Result};
use crate::filter::{FileExtFilter, FileNameFilter, FileSizeFilter, Filter};

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:102.0) Gecko/20100101 Firefox/102.0";

/// How a selected file is materialized on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    /// Stream, decrypt and write the content.
    #[default]
    Full,
    /// Create an empty placeholder without transferring content.
    Touch,
    /// Do nothing, only report the target path.
    Skip,
}

/// What to do when the output file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Ask the injected decision callback.
    #[default]
    Ask,
    /// Overwrite without asking.
    Always,
    /// Keep the existing file.
    Never,
}

/// Reaction to a meta MAC mismatch after a full download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// Report the file as failed.
    #[default]
    Fail,
    /// Log the mismatch and keep the file as completed.
    Warn,
}

macro_rules! lowercase_enum_str {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok(<$ty>::$variant),)+
                    other => Err(format!(
                        "invalid value '{}', expected one of: {}",
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(<$ty>::$variant => f.write_str($text),)+
                }
            }
        }
    };
}

lowercase_enum_str!(DownloadMode { Full => "full", Touch => "touch", Skip => "skip" });
lowercase_enum_str!(OverwritePolicy { Ask => "ask", Always => "always", Never => "never" });
lowercase_enum_str!(IntegrityPolicy { Fail => "fail", Warn => "warn" });

/// Inclusive-exclusive numeric window, written `min-max` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value < self.max
    }
}

impl FromStr for Range {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid range '{}', expected MIN-MAX", s))?;
        let min: f64 = min
            .trim()
            .parse()
            .map_err(|_| format!("invalid range minimum '{}'", min))?;
        let max: f64 = max
            .trim()
            .parse()
            .map_err(|_| format!("invalid range maximum '{}'", max))?;
        if min < 0.0 || max < min {
            return Err(format!("invalid range '{}': need 0 <= MIN <= MAX", s));
        }
        Ok(Self { min, max })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Downloader configuration (loadable from TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Destination base directory
    pub dest_base: PathBuf,
    /// Retry budget per API request
    pub retries: u32,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Socket read timeout in seconds
    pub read_timeout_secs: u64,
    /// Randomized backoff window (seconds) after a failed attempt
    pub retry_delay: Range,
    /// Base pacing delay (seconds) between consecutive API calls
    pub request_delay: f64,
    /// Disable API call pacing
    pub nodelay: bool,
    /// Proxy URL (`http`, `socks4`, `socks5` or `socks5h`)
    pub proxy: Option<String>,
    pub user_agent: String,
    pub extra_headers: BTreeMap<String, String>,
    pub extra_cookies: BTreeMap<String, String>,
    /// Maximum number of files downloaded at once
    pub max_jobs: usize,
    pub download_mode: DownloadMode,
    pub overwrite: OverwritePolicy,
    pub integrity: IntegrityPolicy,
    /// Keep files whose size in MB falls in `[min, max)`
    pub filter_filesize: Option<Range>,
    /// Keep files whose name matches this glob
    pub filter_filename: Option<String>,
    /// Keep files with one of these extensions
    pub filter_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dest_base: PathBuf::from("."),
            retries: 50,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            retry_delay: Range::new(4.0, 8.0),
            request_delay: 0.3,
            nodelay: false,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            extra_headers: BTreeMap::new(),
            extra_cookies: BTreeMap::new(),
            max_jobs: 1,
            download_mode: DownloadMode::Full,
            overwrite: OverwritePolicy::Ask,
            integrity: IntegrityPolicy::Fail,
            filter_filesize: None,
            filter_filename: None,
            filter_extensions: Vec::new(),
        }
    }
}

impl Config {
    /// Load a configuration file; absent keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| MegaError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.max_jobs == 0 {
            return Err(MegaError::Config("max_jobs must be at least 1".into()));
        }
        if self.retry_delay.min < 0.0 || self.retry_delay.max < self.retry_delay.min {
            return Err(MegaError::Config(format!(
                "retry_delay {} is not a valid window",
                self.retry_delay
            )));
        }
        if self.request_delay < 0.0 {
            return Err(MegaError::Config("request_delay must not be negative".into()));
        }
        if let Some(proxy) = &self.proxy {
            validate_proxy(proxy)?;
        }
        if let Some(pattern) = &self.filter_filename {
            glob::Pattern::new(pattern)
                .map_err(|e| MegaError::Config(format!("filter_filename '{}': {}", pattern, e)))?;
        }
        Ok(())
    }

    /// Instantiate the configured filters.
    pub fn build_filters(&self) -> Result<Vec<Box<dyn Filter>>> {
        let mut filters: Vec<Box<dyn Filter>> = Vec::new();
        if let Some(range) = self.filter_filesize {
            filters.push(Box::new(FileSizeFilter::new(range)));
        }
        if let Some(pattern) = &self.filter_filename {
            filters.push(Box::new(FileNameFilter::new(pattern)?));
        }
        if !self.filter_extensions.is_empty() {
            filters.push(Box::new(FileExtFilter::new(self.filter_extensions.as_slice())));
        }
        Ok(filters)
    }
}

fn validate_proxy(proxy: &str) -> Result<()> {
    let (scheme, rest) = proxy
        .split_once("://")
        .ok_or_else(|| MegaError::Config(format!("proxy '{}' has no scheme", proxy)))?;
    if !matches!(scheme, "http" | "socks4" | "socks5" | "socks5h") {
        return Err(MegaError::Config(format!("invalid proxy type '{}'", scheme)));
    }
    let host = rest.rsplit_once('@').map(|(_, h)| h).unwrap_or(rest);
    let (_, port) = host
        .rsplit_once(':')
        .ok_or_else(|| MegaError::Config(format!("proxy '{}' has no port", proxy)))?;
    match port.parse::<u16>() {
        Ok(p) if p > 20 => Ok(()),
        _ => Err(MegaError::Config(format!("invalid proxy port '{}'", port))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.max_jobs, 1);
        assert_eq!(config.retries, 50);
        assert_eq!(config.download_mode, DownloadMode::Full);
        assert_eq!(config.integrity, IntegrityPolicy::Fail);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            max_jobs = 3
            download_mode = "touch"
            filter_filesize = { min = 1.0, max = 5.0 }
            "#,
        )
        .unwrap();
        assert_eq!(config.max_jobs, 3);
        assert_eq!(config.download_mode, DownloadMode::Touch);
        assert_eq!(config.filter_filesize, Some(Range::new(1.0, 5.0)));
        assert_eq!(config.retries, 50);
    }

    #[test]
    fn test_range_parsing() {
        assert_eq!("1-2.5".parse::<Range>().unwrap(), Range::new(1.0, 2.5));
        assert!("5-1".parse::<Range>().is_err());
        assert!("abc".parse::<Range>().is_err());
        assert!(Range::new(1.0, 2.0).contains(1.0));
        assert!(!Range::new(1.0, 2.0).contains(2.0));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("TOUCH".parse::<DownloadMode>().unwrap(), DownloadMode::Touch);
        assert_eq!("never".parse::<OverwritePolicy>().unwrap(), OverwritePolicy::Never);
        assert!("sometimes".parse::<IntegrityPolicy>().is_err());
        assert_eq!(DownloadMode::Skip.to_string(), "skip");
    }

    #[test]
    fn test_proxy_validation() {
        assert!(validate_proxy("socks5://user:pw@127.0.0.1:1080").is_ok());
        assert!(validate_proxy("http://10.0.0.1:8080").is_ok());
        assert!(validate_proxy("ftp://10.0.0.1:8080").is_err());
        assert!(validate_proxy("http://10.0.0.1").is_err());
        assert!(validate_proxy("http://10.0.0.1:20").is_err());
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let config = Config {
            max_jobs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
