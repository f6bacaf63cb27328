//! Virtual path tree built from a flat node list.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::warn;

use super::node::Node;

/// Server label of the account root; mapped to `.`.
pub const ROOT_LABEL: &str = "Cloud Drive";

/// Path -> node mapping, ordered by path components.
#[derive(Debug, Clone, Default)]
pub struct PathTree {
    entries: BTreeMap<PathBuf, Node>,
}

/// Make a decrypted name safe to use as one path component.
pub(crate) fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

fn child_path(parent: &Path, name: &str) -> PathBuf {
    if parent == Path::new(".") {
        PathBuf::from(name)
    } else {
        parent.join(name)
    }
}

impl PathTree {
    /// Walk parent -> child edges depth-first from each root handle.
    ///
    /// Siblings that decrypt to the same name overwrite each other; the last
    /// one visited wins.
    pub fn build(nodes: Vec<Node>, roots: &[&str]) -> Self {
        let mut by_handle: HashMap<String, Node> = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for node in nodes {
            if let Some(parent) = &node.parent_handle {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(node.handle.clone());
            }
            by_handle.insert(node.handle.clone(), node);
        }

        let mut entries: BTreeMap<PathBuf, Node> = BTreeMap::new();
        let mut visited: HashSet<String> = HashSet::new();

        for root_id in roots {
            let Some(root) = by_handle.get(*root_id) else {
                warn!("Root node {} not found", root_id);
                continue;
            };
            let root_path = if root.name == ROOT_LABEL {
                PathBuf::from(".")
            } else {
                PathBuf::from(sanitize(&root.name))
            };
            visited.insert(root.handle.clone());
            entries.insert(root_path.clone(), root.clone());

            let mut stack: Vec<(String, PathBuf)> = vec![(root.handle.clone(), root_path)];
            while let Some((parent_id, parent_path)) = stack.pop() {
                let Some(kids) = children.get(&parent_id) else {
                    continue;
                };
                for kid_id in kids {
                    if !visited.insert(kid_id.clone()) {
                        continue;
                    }
                    let Some(kid) = by_handle.get(kid_id) else {
                        continue;
                    };
                    let path = child_path(&parent_path, &sanitize(&kid.name));
                    if let Some(previous) = entries.insert(path.clone(), kid.clone()) {
                        warn!(
                            "Duplicate path {}: node {} replaces node {}",
                            path.display(),
                            kid.handle,
                            previous.handle
                        );
                    }
                    if kid.is_folder() {
                        stack.push((kid.handle.clone(), path));
                    }
                }
            }
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&Node> {
        self.entries.get(path.as_ref())
    }

    /// All entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Node)> {
        self.entries.iter()
    }

    /// File entries in path order.
    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &Node)> {
        self.entries.iter().filter(|(_, node)| node.is_file())
    }

    /// JSON object keyed by POSIX path.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (path, node) in &self.entries {
            let key = path
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            map.insert(
                key,
                serde_json::to_value(node).unwrap_or(Value::Null),
            );
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::node::NodeType;

    fn node(h: &str, p: &str, name: &str, t: NodeType) -> Node {
        Node {
            name: name.into(),
            handle: h.into(),
            parent_handle: (!p.is_empty()).then(|| p.to_string()),
            owner: "u".into(),
            node_type: t,
            size: 0,
            timestamp: 0,
            keys: None,
        }
    }

    #[test]
    fn test_paths_are_nested_and_sorted() {
        let nodes = vec![
            node("r", "", "Album", NodeType::Folder),
            node("b", "r", "b.jpg", NodeType::File),
            node("s", "r", "sub", NodeType::Folder),
            node("a", "s", "a.jpg", NodeType::File),
            node("z", "r", "a.txt", NodeType::File),
        ];
        let tree = PathTree::build(nodes, &["r"]);
        let paths: Vec<_> = tree.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("Album"),
                PathBuf::from("Album/a.txt"),
                PathBuf::from("Album/b.jpg"),
                PathBuf::from("Album/sub"),
                PathBuf::from("Album/sub/a.jpg"),
            ]
        );
        assert_eq!(tree.files().count(), 3);
    }

    #[test]
    fn test_cloud_drive_root_is_dot() {
        let nodes = vec![
            node("r", "", ROOT_LABEL, NodeType::Root),
            node("f", "r", "x.bin", NodeType::File),
        ];
        let tree = PathTree::build(nodes, &["r"]);
        assert!(tree.get(".").is_some());
        assert!(tree.get("x.bin").is_some());
    }

    #[test]
    fn test_duplicate_names_last_wins() {
        let nodes = vec![
            node("r", "", "root", NodeType::Folder),
            node("one", "r", "same.txt", NodeType::File),
            node("two", "r", "same.txt", NodeType::File),
        ];
        let tree = PathTree::build(nodes, &["r"]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get("root/same.txt").unwrap().handle, "two");
    }

    #[test]
    fn test_hostile_names_stay_inside_tree() {
        let nodes = vec![
            node("r", "", "root", NodeType::Folder),
            node("f", "r", "../../etc/passwd", NodeType::File),
            node("g", "r", "..", NodeType::File),
        ];
        let tree = PathTree::build(nodes, &["r"]);
        assert!(tree.get("root/.._.._etc_passwd").is_some());
        assert!(tree.get("root/_").is_some());
    }

    #[test]
    fn test_cycles_terminate() {
        let nodes = vec![
            node("r", "", "root", NodeType::Folder),
            node("a", "b", "a", NodeType::Folder),
            node("b", "a", "b", NodeType::Folder),
        ];
        let tree = PathTree::build(nodes, &["r"]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_json_keys_use_posix_separator() {
        let nodes = vec![
            node("r", "", "root", NodeType::Folder),
            node("f", "r", "x", NodeType::File),
        ];
        let json = PathTree::build(nodes, &["r"]).to_json();
        assert!(json.get("root/x").is_some());
    }
}
