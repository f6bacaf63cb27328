//! Download hooks.
//!
//! Before-download hooks see every file right before it is fetched;
//! after-scan hooks see the path tree of each scanned folder. `finish` runs
//! once when all links are processed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};
use tracing::info;

use crate::download::DownloadParams;
use crate::error::{MegaError, Result};
use crate::fs::PathTree;

/// Called with the parameters of each file about to be downloaded.
pub trait BeforeDownloadHook: Send + Sync {
    fn execute(&self, url: &str, params: &DownloadParams);

    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Called with the path tree of each scanned folder.
pub trait AfterScanHook: Send + Sync {
    fn execute(&self, root_id: &str, tree: &PathTree);

    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// File stem for dump output derived from the first link.
pub fn dump_file_stem(url: &str) -> String {
    let tail = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("mega.nz")
        .trim_start_matches("mega.co.nz");
    let cleaned: String = tail
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("mega{}_{}", cleaned, stamp)
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text)?;
    Ok(())
}

fn lock_err<T>(_: T) -> MegaError {
    MegaError::Custom("hook state lock poisoned".to_string())
}

/// Collects the download parameters of every file, grouped by link.
#[derive(Debug)]
pub struct DumpLinksHook {
    path: PathBuf,
    dest_base: PathBuf,
    args: String,
    entries: Mutex<BTreeMap<String, Vec<Value>>>,
}

impl DumpLinksHook {
    pub fn new(path: impl Into<PathBuf>, dest_base: impl Into<PathBuf>, args: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dest_base: dest_base.into(),
            args: args.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BeforeDownloadHook for DumpLinksHook {
    fn execute(&self, url: &str, params: &DownloadParams) {
        let relative = params
            .output_path
            .strip_prefix(&self.dest_base)
            .unwrap_or(&params.output_path);
        let posix = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let entry = json!({
            "index": params.index,
            "direct_file_url": params.direct_url,
            "output_path": posix,
            "file_size": params.file_size,
            "iv": params.iv,
            "meta_mac": params.meta_mac,
            "k_decrypted": params.cipher_key,
        });
        if let Ok(mut entries) = self.entries.lock() {
            entries.entry(url.to_string()).or_default().push(entry);
        }
    }

    fn finish(&self) -> Result<()> {
        let entries = self.entries.lock().map_err(lock_err)?;
        let mut out = Map::new();
        out.insert("args".to_string(), Value::String(self.args.clone()));
        for (url, params) in entries.iter() {
            out.insert(url.clone(), Value::Array(params.clone()));
        }
        info!("[DumpLinksHook] Saving to {}", self.path.display());
        write_json(&self.path, &Value::Object(out))
    }
}

/// Records the path tree of every scanned folder, keyed by root handle.
#[derive(Debug)]
pub struct DumpStructureHook {
    path: PathBuf,
    trees: Mutex<BTreeMap<String, Value>>,
}

impl DumpStructureHook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            trees: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AfterScanHook for DumpStructureHook {
    fn execute(&self, root_id: &str, tree: &PathTree) {
        if let Ok(mut trees) = self.trees.lock() {
            trees.insert(root_id.to_string(), tree.to_json());
        }
    }

    fn finish(&self) -> Result<()> {
        let trees = self.trees.lock().map_err(lock_err)?;
        let out: Map<String, Value> = trees.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        info!("[DumpStructureHook] Saving to {}", self.path.display());
        write_json(&self.path, &Value::Object(out))
    }
}
