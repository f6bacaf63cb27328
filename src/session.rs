//! Anonymous session and read-only node access.

use serde_json::{json, Value};
use tracing::{debug, info, trace};

use crate::api::ApiClient;
use crate::base64::{a32_to_base64, a32_to_bytes, base64_to_a32, base64url_decode, base64url_encode, bytes_to_a32};
use crate::crypto::keys::{to_key, unwrap_key, wrap_key};
use crate::crypto::make_random_key;
use crate::error::{MegaError, Result};
use crate::fs::{FetchNodesResponse, Node, NodeResolver, NodeType};

/// Which node set to fetch.
#[derive(Debug, Clone)]
pub enum FetchScope {
    /// The session's own account tree.
    Account,
    /// A public folder link.
    PublicFolder {
        folder_id: String,
        folder_key: [u32; 4],
    },
}

/// Resolved nodes plus the handles to start the path walk from.
#[derive(Debug, Clone)]
pub struct NodeListing {
    pub nodes: Vec<Node>,
    pub roots: Vec<String>,
}

/// Download location of a file.
#[derive(Debug, Clone)]
pub struct FileLink {
    /// Direct content URL (https)
    pub url: String,
    pub size: u64,
    /// Encrypted attributes (`at`), present on public file replies
    pub attributes: Option<String>,
}

fn ensure_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

/// An anonymous, logged-in session.
#[derive(Debug)]
pub struct Session {
    api: ApiClient,
    master_key: [u32; 4],
    user_id: String,
}

impl Session {
    /// Register a throwaway account and log into it.
    ///
    /// Generates master key, password key and self-challenge locally, sends
    /// the wrapped master key (`up`), then fetches the session (`us`). The
    /// returned temporary session id must carry `E(challenge)` under the
    /// master key in its last 16 bytes.
    pub async fn login_anonymous(api: ApiClient) -> Result<Self> {
        info!("Logging in as anonymous...");
        let master_key = make_random_key();
        let password_key = make_random_key();
        let challenge = make_random_key();

        let wrapped_master = wrap_key(&master_key, &password_key)?;
        let mut ts = a32_to_bytes(&challenge);
        ts.extend(a32_to_bytes(&wrap_key(&challenge, &master_key)?));

        let reply = api
            .query(
                json!({
                    "a": "up",
                    "k": a32_to_base64(&wrapped_master),
                    "ts": base64url_encode(&ts),
                }),
                &[],
            )
            .await?;
        let user_handle = reply
            .as_str()
            .ok_or_else(|| MegaError::Login(format!("Unexpected 'up' reply: {}", reply)))?
            .to_string();

        let reply = api.query(json!({"a": "us", "user": &user_handle}), &[]).await?;

        let k = reply
            .get("k")
            .and_then(Value::as_str)
            .ok_or_else(|| MegaError::Login("Login reply carries no master key".to_string()))?;
        let master_key = to_key(&unwrap_key(&base64_to_a32(k)?, &password_key)?)?;

        let tsid = reply.get("tsid").and_then(Value::as_str).ok_or_else(|| {
            let csid = reply.get("csid").and_then(Value::as_str).unwrap_or("UNK");
            MegaError::Login(format!("Login reply does not contain 'tsid' (csid: '{}')", csid))
        })?;
        Self::check_tsid(tsid, &master_key)?;
        api.set_session_id(tsid.to_string());

        let user_id = reply
            .get("u")
            .and_then(Value::as_str)
            .unwrap_or(user_handle.as_str())
            .to_string();
        debug!("Logged in as {}", user_id);

        Ok(Self {
            api,
            master_key,
            user_id,
        })
    }

    /// Session that never logged in; for exercising local code paths.
    #[cfg(test)]
    pub(crate) fn offline(api: ApiClient) -> Self {
        Self {
            api,
            master_key: [0; 4],
            user_id: "offline".to_string(),
        }
    }

    /// Verify the self-challenge embedded in a temporary session id.
    pub fn check_tsid(tsid: &str, master_key: &[u32; 4]) -> Result<()> {
        let raw = base64url_decode(tsid)?;
        if raw.len() < 32 {
            return Err(MegaError::Login(format!(
                "Session id too short ({} bytes)",
                raw.len()
            )));
        }
        let challenge = bytes_to_a32(&raw[..16]);
        let expected = a32_to_bytes(&wrap_key(&challenge, master_key)?);
        if expected[..] != raw[raw.len() - 16..] {
            return Err(MegaError::Login("Session id failed validation".to_string()));
        }
        Ok(())
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn master_key(&self) -> &[u32; 4] {
        &self.master_key
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Fetch and resolve a node set.
    pub async fn fetch_nodes(&self, scope: &FetchScope) -> Result<NodeListing> {
        let value = match scope {
            FetchScope::Account => self.api.query(json!({"a": "f", "c": 1, "r": 1}), &[]).await?,
            FetchScope::PublicFolder { folder_id, .. } => {
                self.api
                    .query(
                        json!({"a": "f", "c": 1, "ca": 1, "r": 1}),
                        &[("n", folder_id.as_str())],
                    )
                    .await?
            }
        };
        let reply: FetchNodesResponse = serde_json::from_value(value)?;
        trace!("Fetched {} node records", reply.f.len());

        let mut resolver = NodeResolver::new(self.master_key, self.user_id.clone());
        resolver.register_shares(&reply);
        if let FetchScope::PublicFolder { folder_key, .. } = scope {
            resolver.register_export(&reply.f, *folder_key);
        }
        let nodes = resolver.resolve_all(&reply.f);

        let roots = match scope {
            FetchScope::Account => nodes
                .iter()
                .filter(|n| n.node_type == NodeType::Root)
                .map(|n| n.handle.clone())
                .collect(),
            // The shared root comes first.
            FetchScope::PublicFolder { .. } => {
                nodes.first().map(|n| vec![n.handle.clone()]).unwrap_or_default()
            }
        };

        Ok(NodeListing { nodes, roots })
    }

    /// Download location of a public file.
    pub async fn file_link(&self, file_id: &str) -> Result<FileLink> {
        let reply = self
            .api
            .query(json!({"a": "g", "g": 1, "p": file_id}), &[])
            .await?;
        Self::parse_link(&reply, file_id)
    }

    /// Download location of a file inside a public folder.
    pub async fn folder_file_link(&self, folder_id: &str, handle: &str) -> Result<FileLink> {
        let reply = self
            .api
            .query(json!({"a": "g", "g": 1, "n": handle}), &[("n", folder_id)])
            .await?;
        Self::parse_link(&reply, handle)
    }

    fn parse_link(reply: &Value, id: &str) -> Result<FileLink> {
        let url = reply.get("g").and_then(Value::as_str).ok_or_else(|| {
            MegaError::Protocol(format!("File {} not accessible anymore", id))
        })?;
        let size = reply
            .get("s")
            .and_then(Value::as_u64)
            .ok_or_else(|| MegaError::Protocol(format!("File {} reply has no size", id)))?;
        Ok(FileLink {
            url: ensure_https(url),
            size,
            attributes: reply.get("at").and_then(Value::as_str).map(str::to_string),
        })
    }
}
