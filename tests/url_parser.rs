use megadl::url::{compose_url, parse_url};
use megadl::{MegaError, ParsedUrl};
use proptest::prelude::*;

fn handle() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_]{1,16}"
}

fn key() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,43}"
}

proptest! {
    #[test]
    fn prop_file_links(file_id in handle(), key in key()) {
        let parsed = parse_url(&compose_url("", &file_id, &key)).unwrap();
        prop_assert_eq!(parsed, ParsedUrl { folder_id: String::new(), file_id, key_b64: key });
    }

    #[test]
    fn prop_folder_links(folder_id in handle(), file_id in proptest::option::of(handle()), key in key()) {
        let file_id = file_id.unwrap_or_default();
        let parsed = parse_url(&compose_url(&folder_id, &file_id, &key)).unwrap();
        prop_assert_eq!(parsed, ParsedUrl { folder_id, file_id, key_b64: key });
    }
}

#[test]
fn test_garbage_is_a_format_error() {
    for url in ["", "https://example.com/file", "https://mega.nz/folder/abc", "https://mega.nz/file/#"] {
        assert!(matches!(parse_url(url), Err(MegaError::Format(_))), "{}", url);
    }
}
