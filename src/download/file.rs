//! Single-file links and the per-file write path.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use super::stream::decrypt_stream;
use super::{DownloadOutcome, DownloadParams, DownloadStatus, Downloader};
use crate::base64::{base64_to_a32, base64url_decode};
use crate::config::{DownloadMode, IntegrityPolicy, OverwritePolicy};
use crate::crypto::keys::{decrypt_attributes, fold_file_key, Attributes};
use crate::error::{MegaError, Result};
use crate::filter::any_filter_matching;
use crate::fs::tree::sanitize;
use crate::fs::{Node, NodeKeys, NodeType};
use crate::progress::TransferProgress;
use crate::url::ParsedUrl;

const MB: f64 = 1024.0 * 1024.0;

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl Downloader {
    pub(super) async fn download_file(&self, url: &str, parsed: &ParsedUrl) -> Result<DownloadOutcome> {
        let raw_key = base64_to_a32(&parsed.key_b64)
            .map_err(|e| MegaError::Format(format!("Invalid file key in '{}': {}", url, e)))?;
        let key = fold_file_key(&raw_key)
            .map_err(|_| MegaError::Format(format!("File key in '{}' is too short", url)))?;

        let fallback = self.config.dest_base.join(sanitize(&parsed.file_id));
        let link = match self.session.file_link(&parsed.file_id).await {
            Ok(link) => link,
            Err(MegaError::Aborted) => {
                return Ok(DownloadOutcome::new(0, fallback, DownloadStatus::Aborted));
            }
            Err(e) => {
                error!("File {} ({}): {}", parsed.file_id, url, e);
                return Ok(DownloadOutcome::new(0, fallback, DownloadStatus::Failed(e.to_string())));
            }
        };

        let attributes = link
            .attributes
            .as_deref()
            .and_then(|at| base64url_decode(at).ok())
            .map(|data| decrypt_attributes(&data, &key.cipher_key))
            .unwrap_or_else(Attributes::unknown);

        let node = Node {
            name: attributes.name,
            handle: parsed.file_id.clone(),
            parent_handle: None,
            owner: String::new(),
            node_type: NodeType::File,
            size: link.size,
            timestamp: 0,
            keys: Some(NodeKeys {
                cipher_key: key.cipher_key,
                iv: key.iv,
                meta_mac: key.meta_mac,
            }),
        };
        // The name comes from the server; keep it a single component.
        let output_path = self.config.dest_base.join(sanitize(&node.name));

        if let Some(filter) = any_filter_matching(&node, &self.filters) {
            info!("File {} was filtered out by {}. Skipped!", node.name, filter);
            return Ok(DownloadOutcome::new(0, output_path, DownloadStatus::Filtered));
        }

        let params = DownloadParams {
            index: 0,
            direct_url: link.url,
            output_path,
            file_size: link.size,
            iv: key.iv,
            meta_mac: key.meta_mac,
            cipher_key: key.cipher_key,
        };
        for hook in &self.before_hooks {
            hook.execute(url, &params);
        }
        Ok(self.download(&params).await)
    }

    /// Materialize one file according to the configured mode and policies.
    ///
    /// Never fails: every problem is folded into the outcome's status.
    pub async fn download(&self, params: &DownloadParams) -> DownloadOutcome {
        let status = match self.write_file(params).await {
            Ok(status) => status,
            Err(MegaError::Aborted) => DownloadStatus::Aborted,
            Err(e) => {
                error!(
                    "[{}] FAILED to download {} from {}: {}",
                    params.index + 1,
                    params.output_path.display(),
                    params.direct_url,
                    e
                );
                DownloadStatus::Failed(e.to_string())
            }
        };
        DownloadOutcome::new(params.index, params.output_path.clone(), status)
    }

    async fn write_file(&self, params: &DownloadParams) -> Result<DownloadStatus> {
        let mode = self.config.download_mode;
        let path = &params.output_path;
        let name = display_name(path);
        let tag = params.index + 1;

        if mode == DownloadMode::Skip {
            info!("[{}] {} skipped (skip mode)", tag, name);
            return Ok(DownloadStatus::Skipped);
        }
        if self.is_aborted() {
            return Ok(DownloadStatus::Aborted);
        }

        if let Ok(meta) = tokio::fs::metadata(path).await {
            let existing = meta.len();
            let placeholder = mode == DownloadMode::Touch && existing == 0;
            if !placeholder {
                if !self.may_overwrite(path, existing, params.file_size).await {
                    warn!("[{}] {} already exists. Skipped!", tag, path.display());
                    return Ok(DownloadStatus::Skipped);
                }
                warn!("[{}] {} already exists. Overwriting...", tag, path.display());
            }
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(path).await?;

        if mode == DownloadMode::Touch {
            info!("[{}] {} touched", tag, name);
            return Ok(DownloadStatus::Touched);
        }

        info!(
            "[{}] Saving {} ({:.2} MB)...",
            tag,
            name,
            params.file_size as f64 / MB
        );
        let response = self.session.api().http().get(&params.direct_url).await?;
        let abort = self.session.api().abort_flag();
        let report = decrypt_stream(
            Box::pin(response.bytes_stream()),
            params,
            &mut file,
            &abort,
            |done| {
                self.report(TransferProgress::new(
                    params.index,
                    done,
                    params.file_size,
                    name.clone(),
                ))
            },
        )
        .await?;
        drop(file);

        if report.aborted {
            warn!("[{}] {} aborted after {} bytes", tag, name, report.written);
            return Ok(DownloadStatus::Aborted);
        }

        let on_disk = tokio::fs::metadata(path).await?.len();
        if on_disk != params.file_size {
            warn!(
                "[{}] {} NOT completed ({:.2} / {:.2} MB)",
                tag,
                name,
                on_disk as f64 / MB,
                params.file_size as f64 / MB
            );
            return Ok(DownloadStatus::Incomplete);
        }

        if let Err(e) = report.integrity {
            match self.config.integrity {
                IntegrityPolicy::Fail => {
                    error!("[{}] {}: {}", tag, name, e);
                    return Ok(DownloadStatus::IntegrityFailed);
                }
                IntegrityPolicy::Warn => warn!("[{}] {}: {}", tag, name, e),
            }
        }

        info!("[{}] {} completed ({:.2} MB)", tag, name, on_disk as f64 / MB);
        Ok(DownloadStatus::Completed)
    }

    async fn may_overwrite(&self, path: &Path, existing: u64, expected: u64) -> bool {
        match self.config.overwrite {
            OverwritePolicy::Always => true,
            OverwritePolicy::Never => false,
            OverwritePolicy::Ask => {
                let decider = self.decider.clone();
                let path: PathBuf = path.to_path_buf();
                tokio::task::spawn_blocking(move || decider.confirm_overwrite(&path, existing, expected))
                    .await
                    .unwrap_or(false)
            }
        }
    }
}
