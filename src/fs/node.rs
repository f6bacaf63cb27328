//! Node records as sent by the server and as resolved locally.

use serde::{Deserialize, Serialize};

/// Node type enumeration matching MEGA's internal types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    /// Regular file
    File = 0,
    /// Folder/directory
    Folder = 1,
    /// Root folder (Cloud Drive)
    Root = 2,
    /// Inbox folder
    Inbox = 3,
    /// Trash folder
    Trash = 4,
}

impl NodeType {
    /// Create from integer type value.
    pub fn from_i64(t: i64) -> Option<Self> {
        match t {
            0 => Some(NodeType::File),
            1 => Some(NodeType::Folder),
            2 => Some(NodeType::Root),
            3 => Some(NodeType::Inbox),
            4 => Some(NodeType::Trash),
            _ => None,
        }
    }

    /// Check if this node type is a container (can have children).
    pub fn is_container(&self) -> bool {
        !matches!(self, NodeType::File)
    }
}

/// One entry of the `f` array of a fetch-nodes reply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawNode {
    /// Handle
    pub h: String,
    /// Parent handle
    pub p: String,
    /// Owner user id
    pub u: String,
    /// Type
    pub t: i64,
    /// Encrypted attributes
    pub a: String,
    /// `owner:wrappedkey` list separated by `/`
    pub k: String,
    /// Size
    pub s: u64,
    /// Timestamp
    pub ts: i64,
    /// Sharing user, present on shared folder roots
    pub su: Option<String>,
    /// Share key wrapped with the master key
    pub sk: Option<String>,
}

impl RawNode {
    /// Split the key field into `(id, wrapped_key)` pairs.
    pub fn key_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.k
            .split('/')
            .filter_map(|entry| entry.split_once(':'))
            .filter(|(_, key)| !key.is_empty())
    }
}

/// Entry of the `ok` array: a share key wrapped with the master key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OwnerKey {
    pub h: String,
    pub k: String,
}

/// Entry of the `s` array: which user shares which handle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShareRecord {
    pub h: String,
    pub u: String,
}

/// Fetch-nodes reply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FetchNodesResponse {
    pub f: Vec<RawNode>,
    pub ok: Vec<OwnerKey>,
    pub s: Vec<ShareRecord>,
}

/// Key material of a resolved node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeKeys {
    /// Content/attribute key
    pub cipher_key: [u32; 4],
    /// CTR nonce in the first two words; zero for folders
    pub iv: [u32; 4],
    /// Expected condensed MAC; zero for folders
    pub meta_mac: [u32; 2],
}

/// A resolved node.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// Node name (decrypted)
    pub name: String,
    /// Node handle (unique identifier)
    pub handle: String,
    /// Parent node handle
    pub parent_handle: Option<String>,
    /// Owning user id
    pub owner: String,
    /// Node type
    pub node_type: NodeType,
    /// File size in bytes (0 for folders)
    pub size: u64,
    /// Timestamp (Unix epoch)
    pub timestamp: i64,
    /// Present only when key resolution succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<NodeKeys>,
}

impl Node {
    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    /// Check if this node is a folder (any container type).
    pub fn is_folder(&self) -> bool {
        self.node_type.is_container()
    }

    /// A file whose key was resolved and may be downloaded.
    pub fn is_downloadable(&self) -> bool {
        self.is_file() && self.keys.is_some()
    }
}
