//! Public folder resolution end to end: raw records -> keys -> path tree.

mod common;

use common::encrypt_attributes;
use megadl::base64::a32_to_base64;
use megadl::crypto::keys::{fold_file_key, wrap_key, UNKNOWN_OBJECT};
use megadl::fs::{NodeResolver, PathTree, RawNode};

const FOLDER_KEY: [u32; 4] = [0x1111, 0x2222, 0x3333, 0x4444];
const ROOT_KEY: [u32; 4] = [0xa, 0xb, 0xc, 0xd];
const SUB_KEY: [u32; 4] = [0xe, 0xf, 0x10, 0x11];
const FILE_KEY: [u32; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

fn record(h: &str, p: &str, t: i64, k: String, a: String, s: u64) -> RawNode {
    RawNode {
        h: h.into(),
        p: p.into(),
        u: "owner".into(),
        t,
        a,
        k,
        s,
        ..RawNode::default()
    }
}

fn wrapped(owner: &str, plain: &[u32]) -> String {
    format!("{}:{}", owner, a32_to_base64(&wrap_key(plain, &FOLDER_KEY).unwrap()))
}

fn records() -> Vec<RawNode> {
    let file_cipher = fold_file_key(&FILE_KEY).unwrap().cipher_key;
    vec![
        record("root", "", 1, wrapped("root", &ROOT_KEY), encrypt_attributes("Photos", &ROOT_KEY), 0),
        // listed before its parent
        record("pic", "sub", 0, wrapped("root", &FILE_KEY), encrypt_attributes("pic.jpg", &file_cipher), 2048),
        record("sub", "root", 1, wrapped("root", &SUB_KEY), encrypt_attributes("2023", &SUB_KEY), 0),
        // key is not a whole block
        record("bad", "root", 0, format!("root:{}", a32_to_base64(&[7, 7, 7])), String::new(), 10),
    ]
}

#[test]
fn test_public_folder_tree() {
    let raw = records();
    let mut resolver = NodeResolver::new([0; 4], "anonymous");
    resolver.register_export(&raw, FOLDER_KEY);
    let nodes = resolver.resolve_all(&raw);
    let tree = PathTree::build(nodes, &["root"]);

    let pic = tree.get("Photos/2023/pic.jpg").unwrap();
    assert!(pic.is_downloadable());
    let keys = pic.keys.unwrap();
    assert_eq!(keys.cipher_key, fold_file_key(&FILE_KEY).unwrap().cipher_key);
    assert_eq!(keys.iv, [5, 6, 0, 0]);
    assert_eq!(keys.meta_mac, [7, 8]);
    assert_eq!(pic.size, 2048);

    assert!(tree.get("Photos").unwrap().is_folder());
    assert!(tree.get("Photos/2023").unwrap().is_folder());
}

#[test]
fn test_unresolvable_node_stays_visible_but_not_downloadable() {
    let raw = records();
    let mut resolver = NodeResolver::new([0; 4], "anonymous");
    resolver.register_export(&raw, FOLDER_KEY);
    let tree = PathTree::build(resolver.resolve_all(&raw), &["root"]);

    let unknown = tree.get(format!("Photos/{}", UNKNOWN_OBJECT)).unwrap();
    assert_eq!(unknown.handle, "bad");
    assert!(unknown.keys.is_none());
    assert!(!unknown.is_downloadable());

    let downloadable: Vec<_> = tree
        .files()
        .filter(|(_, n)| n.is_downloadable())
        .map(|(p, _)| p.clone())
        .collect();
    assert_eq!(downloadable, vec![std::path::PathBuf::from("Photos/2023/pic.jpg")]);
}

#[test]
fn test_record_order_does_not_matter() {
    let mut raw = records();
    raw.reverse();
    let mut resolver = NodeResolver::new([0; 4], "anonymous");
    resolver.register_export(&raw, FOLDER_KEY);
    let tree = PathTree::build(resolver.resolve_all(&raw), &["root"]);
    assert!(tree.get("Photos/2023/pic.jpg").unwrap().is_downloadable());
}
