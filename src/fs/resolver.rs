//! Key resolution for fetched node records.
//!
//! Resolution runs in two phases. First every declared share key is
//! registered in a [`SharedKeyTable`]: the `ok`/`s` lists, every record
//! carrying `su`/`sk` share markers, and for public folders every keyed record
//! under the [`EXPORT_OWNER`] slot. Then each record is resolved on its own,
//! trying in order:
//!
//! 1. the entry of the session user in the node's key list, unwrapped with
//!    the master key;
//! 2. for shared folder roots, the entry for the node itself, unwrapped with
//!    the registered share key;
//! 3. for nodes whose owner has registered share keys, the first entry whose
//!    id is one of that owner's shared handles;
//! 4. for nodes under the export slot, the last entry unwrapped with the
//!    link's folder key.
//!
//! Because registration happens before resolution, the result does not depend
//! on the order of the server's node array.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use super::node::{FetchNodesResponse, Node, NodeKeys, NodeType, RawNode};
use crate::base64::{base64_to_a32, base64url_decode};
use crate::crypto::keys::{decrypt_attributes, fold_file_key, to_key, unwrap_key, Attributes};
use crate::error::Result;

/// Owner slot holding keys derived from a public folder link.
pub const EXPORT_OWNER: &str = "EXP";

/// Owner id -> (node handle -> share key).
#[derive(Debug, Clone, Default)]
pub struct SharedKeyTable {
    owners: HashMap<String, BTreeMap<String, [u32; 4]>>,
}

impl SharedKeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, owner: &str, handle: &str, key: [u32; 4]) {
        self.owners
            .entry(owner.to_string())
            .or_default()
            .insert(handle.to_string(), key);
    }

    pub fn get(&self, owner: &str, handle: &str) -> Option<&[u32; 4]> {
        self.owners.get(owner)?.get(handle)
    }

    /// All share keys registered for one owner, ordered by handle.
    pub fn owner_keys(&self, owner: &str) -> Option<&BTreeMap<String, [u32; 4]>> {
        self.owners.get(owner)
    }

    /// Total number of registered keys.
    pub fn len(&self) -> usize {
        self.owners.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unwrap a base64 key with a 4-word key.
fn unwrap_b64(wrapped: &str, key: &[u32; 4]) -> Result<Vec<u32>> {
    unwrap_key(&base64_to_a32(wrapped)?, key)
}

/// Resolves node keys for one fetch.
#[derive(Debug, Clone)]
pub struct NodeResolver {
    master_key: [u32; 4],
    user_id: String,
    shared_keys: SharedKeyTable,
}

impl NodeResolver {
    pub fn new(master_key: [u32; 4], user_id: impl Into<String>) -> Self {
        Self {
            master_key,
            user_id: user_id.into(),
            shared_keys: SharedKeyTable::new(),
        }
    }

    pub fn shared_keys(&self) -> &SharedKeyTable {
        &self.shared_keys
    }

    /// Phase one: register the share keys declared by a fetch reply.
    pub fn register_shares(&mut self, reply: &FetchNodesResponse) {
        let mut owned: HashMap<&str, [u32; 4]> = HashMap::new();
        for item in &reply.ok {
            match unwrap_b64(&item.k, &self.master_key).and_then(|k| to_key(&k)) {
                Ok(key) => {
                    owned.insert(item.h.as_str(), key);
                }
                Err(e) => debug!("Skipping share key for {}: {}", item.h, e),
            }
        }
        for share in &reply.s {
            if let Some(key) = owned.get(share.h.as_str()) {
                self.shared_keys.insert(&share.u, &share.h, *key);
            }
        }

        for raw in &reply.f {
            let (Some(su), Some(sk)) = (&raw.su, &raw.sk) else {
                continue;
            };
            match unwrap_b64(sk, &self.master_key).and_then(|k| to_key(&k)) {
                Ok(key) => {
                    trace!("Registered shared folder {}/{} from {}", raw.p, raw.h, su);
                    self.shared_keys.insert(su, &raw.h, key);
                }
                Err(e) => debug!("Skipping shared folder {}: {}", raw.h, e),
            }
        }
    }

    /// Phase one for public folder links: every keyed record is reachable
    /// through the link's folder key.
    pub fn register_export(&mut self, nodes: &[RawNode], folder_key: [u32; 4]) {
        for raw in nodes {
            if !raw.h.is_empty() && raw.key_entries().next().is_some() {
                self.shared_keys.insert(EXPORT_OWNER, &raw.h, folder_key);
            }
        }
    }

    /// Find the raw (unfolded) node key.
    fn find_key(&self, raw: &RawNode) -> Option<Vec<u32>> {
        let entries: HashMap<&str, &str> = raw.key_entries().collect();

        // own node
        if let Some(wrapped) = entries.get(self.user_id.as_str()) {
            if let Ok(key) = unwrap_b64(wrapped, &self.master_key) {
                return Some(key);
            }
        }

        // shared folder root
        if let Some(su) = &raw.su {
            if raw.sk.is_some() {
                if let (Some(share_key), Some(wrapped)) =
                    (self.shared_keys.get(su, &raw.h), entries.get(raw.h.as_str()))
                {
                    if let Ok(key) = unwrap_b64(wrapped, share_key) {
                        return Some(key);
                    }
                }
            }
        }

        // node inside a folder shared by its owner
        if !raw.u.is_empty() {
            if let Some(owner_keys) = self.shared_keys.owner_keys(&raw.u) {
                for (handle, share_key) in owner_keys {
                    if let Some(wrapped) = entries.get(handle.as_str()) {
                        if let Ok(key) = unwrap_b64(wrapped, share_key) {
                            return Some(key);
                        }
                    }
                }
            }
        }

        // public folder link
        if let Some(export_key) = self.shared_keys.get(EXPORT_OWNER, &raw.h) {
            if let Some((_, wrapped)) = raw.key_entries().last() {
                if let Ok(key) = unwrap_b64(wrapped, export_key) {
                    return Some(key);
                }
            }
        }

        None
    }

    /// Turn a raw node key into cipher key, IV and meta MAC.
    fn materialize(node_type: NodeType, key: &[u32]) -> Result<NodeKeys> {
        if node_type == NodeType::File {
            let folded = fold_file_key(key)?;
            Ok(NodeKeys {
                cipher_key: folded.cipher_key,
                iv: folded.iv,
                meta_mac: folded.meta_mac,
            })
        } else {
            Ok(NodeKeys {
                cipher_key: to_key(key.get(..4).unwrap_or(key))?,
                iv: [0; 4],
                meta_mac: [0; 2],
            })
        }
    }

    /// Phase two: resolve one record. Returns `None` for unsupported types.
    pub fn resolve(&self, raw: &RawNode) -> Option<Node> {
        let node_type = NodeType::from_i64(raw.t)?;
        trace!("Node {}/{}...", raw.p, raw.h);

        let (name, keys) = match node_type {
            NodeType::File | NodeType::Folder => {
                let keys = self
                    .find_key(raw)
                    .and_then(|key| Self::materialize(node_type, &key).ok());
                let attrs = match (&keys, base64url_decode(&raw.a)) {
                    (Some(keys), Ok(blob)) => decrypt_attributes(&blob, &keys.cipher_key),
                    _ => Attributes::unknown(),
                };
                if keys.is_none() {
                    debug!("No key found for node {}", raw.h);
                }
                (attrs.name, keys)
            }
            NodeType::Root => ("Cloud Drive".to_string(), None),
            NodeType::Inbox => ("Inbox".to_string(), None),
            NodeType::Trash => ("Rubbish Bin".to_string(), None),
        };

        Some(Node {
            name,
            handle: raw.h.clone(),
            parent_handle: (!raw.p.is_empty()).then(|| raw.p.clone()),
            owner: raw.u.clone(),
            node_type,
            size: raw.s,
            timestamp: raw.ts,
            keys,
        })
    }

    /// Resolve every record of a reply, in server order.
    pub fn resolve_all(&self, nodes: &[RawNode]) -> Vec<Node> {
        nodes.iter().filter_map(|raw| self.resolve(raw)).collect()
    }
}
