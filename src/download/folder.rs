//! Folder links: scan, select, download concurrently.

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tracing::{error, info, trace};

use super::{DownloadOutcome, DownloadParams, DownloadStatus, Downloader};
use crate::base64::base64_to_a32;
use crate::crypto::keys::to_key;
use crate::error::{MegaError, Result};
use crate::filter::any_filter_matching;
use crate::fs::{Node, PathTree};
use crate::session::FetchScope;
use crate::url::ParsedUrl;

const MB: f64 = 1024.0 * 1024.0;

/// A file picked for download, with its queue position.
#[derive(Debug, Clone)]
pub(super) struct QueuedFile {
    pub index: usize,
    pub path: PathBuf,
    pub node: Node,
}

/// Files to download plus the target paths of files left out.
#[derive(Debug, Default)]
pub(super) struct Selection {
    pub queue: Vec<QueuedFile>,
    pub excluded: Vec<PathBuf>,
}

impl Downloader {
    pub(super) async fn download_folder(&self, url: &str, parsed: &ParsedUrl) -> Result<Vec<DownloadOutcome>> {
        let raw_key = base64_to_a32(&parsed.key_b64)
            .map_err(|e| MegaError::Format(format!("Invalid folder key in '{}': {}", url, e)))?;
        let folder_key = raw_key
            .get(..4)
            .and_then(|words| to_key(words).ok())
            .ok_or_else(|| MegaError::Format(format!("Folder key in '{}' is too short", url)))?;

        let listing = self
            .session
            .fetch_nodes(&FetchScope::PublicFolder {
                folder_id: parsed.folder_id.clone(),
                folder_key,
            })
            .await?;
        let root_id = listing
            .roots
            .first()
            .cloned()
            .ok_or_else(|| MegaError::Protocol(format!("Folder {} has no nodes", parsed.folder_id)))?;
        let root_name = listing
            .nodes
            .iter()
            .find(|n| n.handle == root_id)
            .map(|n| n.name.clone())
            .unwrap_or_default();

        let roots: Vec<&str> = listing.roots.iter().map(String::as_str).collect();
        let tree = PathTree::build(listing.nodes, &roots);
        let file_count = tree.files().count();
        info!(
            "Folder {}, root {} '{}': found {} files...",
            parsed.folder_id, root_id, root_name, file_count
        );

        for hook in &self.after_hooks {
            hook.execute(&root_id, &tree);
        }

        let selection = self.select(&tree, parsed.pinned_file()).await;
        info!("Saving {} / {} files...", selection.queue.len(), file_count);

        let total = selection.queue.len();
        let mut outcomes: Vec<DownloadOutcome> = stream::iter(selection.queue)
            .map(|queued| self.download_folder_file(url, &parsed.folder_id, queued))
            .buffer_unordered(self.config.max_jobs.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.index);

        let done = outcomes.iter().filter(|o| o.status.is_success()).count();
        info!("Downloaded {} / {} files", done, total);

        outcomes.extend(
            selection
                .excluded
                .into_iter()
                .enumerate()
                .map(|(i, path)| DownloadOutcome::new(total + i, path, DownloadStatus::Filtered)),
        );
        Ok(outcomes)
    }

    /// Decide which files of `tree` get downloaded, in path order.
    pub(super) async fn select(&self, tree: &PathTree, pinned: Option<&str>) -> Selection {
        let mut selection = Selection::default();
        let mut file_idx = 0;

        for (path, node) in tree.files() {
            file_idx += 1;
            let target = self.config.dest_base.join(path);

            if !node.is_downloadable() {
                trace!("[{}] '{}' has no usable key, skipped...", file_idx, path.display());
                selection.excluded.push(target);
                continue;
            }

            if let Some(pinned) = pinned {
                if node.handle != pinned {
                    trace!("[{}] File '{}' is not selected for download, skipped...", file_idx, node.handle);
                    continue;
                }
            } else if !self.filters.is_empty() {
                if let Some(filter) = any_filter_matching(node, &self.filters) {
                    info!("[{}] File {} was filtered out by {}. Skipped!", file_idx, node.name, filter);
                    selection.excluded.push(target);
                    continue;
                }
            } else if !self.ask_download(file_idx, path, node.size).await {
                selection.excluded.push(target);
                continue;
            }

            let index = selection.queue.len();
            info!("[{}] {} enqueued...", index + 1, node.name);
            selection.queue.push(QueuedFile {
                index,
                path: path.clone(),
                node: node.clone(),
            });
        }
        selection
    }

    async fn ask_download(&self, file_idx: usize, path: &Path, size: u64) -> bool {
        let decider = self.decider.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || decider.confirm_download(file_idx, &path, size))
            .await
            .unwrap_or(false)
    }

    async fn download_folder_file(&self, url: &str, folder_id: &str, queued: QueuedFile) -> DownloadOutcome {
        let output_path = self.config.dest_base.join(&queued.path);
        if self.is_aborted() {
            return DownloadOutcome::new(queued.index, output_path, DownloadStatus::Aborted);
        }
        // Selection only queues nodes with keys.
        let Some(keys) = queued.node.keys else {
            return DownloadOutcome::new(queued.index, output_path, DownloadStatus::Filtered);
        };

        let link = match self.session.folder_file_link(folder_id, &queued.node.handle).await {
            Ok(link) => link,
            Err(MegaError::Aborted) => {
                return DownloadOutcome::new(queued.index, output_path, DownloadStatus::Aborted);
            }
            Err(e) => {
                error!(
                    "[{}] {} ({:.2} MB): {}",
                    queued.index + 1,
                    queued.node.name,
                    queued.node.size as f64 / MB,
                    e
                );
                return DownloadOutcome::new(queued.index, output_path, DownloadStatus::Failed(e.to_string()));
            }
        };

        let params = DownloadParams {
            index: queued.index,
            direct_url: link.url,
            output_path,
            file_size: link.size,
            iv: keys.iv,
            meta_mac: keys.meta_mac,
            cipher_key: keys.cipher_key,
        };
        for hook in &self.before_hooks {
            hook.execute(url, &params);
        }
        self.download(&params).await
    }
}
