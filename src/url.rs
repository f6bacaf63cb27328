//! Share link parsing.
//!
//! Recognized shapes:
//! - `https://mega.nz/file/<id>#<key>`
//! - `https://mega.nz/#!<id>!<key>` (legacy file)
//! - `https://mega.nz/folder/<id>#<key>[/file/<pinned-id>]`
//! - `https://mega.nz/#F!<id>#<key>` (legacy folder, `!` also accepted)

use crate::error::{MegaError, Result};

/// Classified share link.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedUrl {
    /// Root folder handle, empty for file links.
    pub folder_id: String,
    /// File handle, or the pinned file inside a folder link.
    pub file_id: String,
    /// Base64 share key (folder key or 8-word file key).
    pub key_b64: String,
}

impl ParsedUrl {
    pub fn is_folder(&self) -> bool {
        !self.folder_id.is_empty()
    }

    /// Folder link that selects a single file.
    pub fn pinned_file(&self) -> Option<&str> {
        (self.is_folder() && !self.file_id.is_empty()).then_some(self.file_id.as_str())
    }
}

fn format_error(url: &str, what: &str) -> MegaError {
    MegaError::Format(format!("{} in '{}'", what, url))
}

/// Is `c` a handle character (word character).
fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn non_empty(parsed: ParsedUrl, url: &str) -> Result<ParsedUrl> {
    if parsed.key_b64.is_empty() {
        return Err(format_error(url, "Missing key"));
    }
    if parsed.folder_id.is_empty() && parsed.file_id.is_empty() {
        return Err(format_error(url, "Missing node id"));
    }
    Ok(parsed)
}

/// Parse a share link.
pub fn parse_url(url: &str) -> Result<ParsedUrl> {
    let url = url.trim();

    // Folder: https://mega.nz/folder/HANDLE#KEY[/file/PINNED]
    if let Some(pos) = url.find("/folder/") {
        let rest = &url[pos + 8..];
        let mut file_id = String::new();
        let mut head = rest;
        if let Some(file_pos) = url.find("/file/") {
            if file_pos < pos {
                return Err(format_error(url, "Unsupported folder file link format"));
            }
            head = rest.split('/').next().unwrap_or("");
            file_id = url[file_pos + 6..].chars().take_while(|c| is_word(*c)).collect();
            if file_id.is_empty() {
                return Err(format_error(url, "Folder file id not found"));
            }
        }
        let (folder_id, key) = head
            .split_once('#')
            .ok_or_else(|| format_error(url, "Missing '#' before folder key"))?;
        return non_empty(
            ParsedUrl {
                folder_id: folder_id.to_string(),
                file_id,
                key_b64: key.to_string(),
            },
            url,
        );
    }

    // Legacy folder: https://mega.nz/#F!HANDLE#KEY
    if let Some(pos) = url.find("#F!") {
        let rest = &url[pos + 3..];
        let (folder_id, key) = rest
            .split_once(['#', '!'])
            .ok_or_else(|| format_error(url, "Missing folder key separator"))?;
        return non_empty(
            ParsedUrl {
                folder_id: folder_id.to_string(),
                file_id: String::new(),
                key_b64: key.to_string(),
            },
            url,
        );
    }

    // File: https://mega.nz/file/HANDLE#KEY
    if let Some(pos) = url.find("/file/") {
        let compact: String = url[pos + 6..].chars().filter(|c| *c != ' ').collect();
        let (file_id, key) = compact
            .split_once(|c: char| !is_word(c))
            .ok_or_else(|| format_error(url, "File id not found"))?;
        return non_empty(
            ParsedUrl {
                folder_id: String::new(),
                file_id: file_id.to_string(),
                key_b64: key.to_string(),
            },
            url,
        );
    }

    // Legacy file: https://mega.nz/#!HANDLE!KEY
    // The whole token after "#!" serves as both id and key.
    if let Some(pos) = url.find("#!") {
        let token = &url[pos + 2..];
        return non_empty(
            ParsedUrl {
                folder_id: String::new(),
                file_id: token.to_string(),
                key_b64: token.to_string(),
            },
            url,
        );
    }

    Err(format_error(url, "Not a MEGA share link"))
}

/// Build a current-format link; the inverse of [`parse_url`] for non-legacy
/// shapes.
pub fn compose_url(folder_id: &str, file_id: &str, key_b64: &str) -> String {
    if folder_id.is_empty() {
        return format!("https://mega.nz/file/{}#{}", file_id, key_b64);
    }
    let mut url = format!("https://mega.nz/folder/{}#{}", folder_id, key_b64);
    if !file_id.is_empty() {
        url.push_str("/file/");
        url.push_str(file_id);
    }
    url
}
