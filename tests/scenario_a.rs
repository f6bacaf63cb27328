//! Live test against the public service.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use megadl::{Config, DownloadMode, DownloadStatus, Downloader, OverwritePolicy};

#[tokio::test]
#[ignore = "requires network access"]
async fn test_touch_mode_creates_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        dest_base: dir.path().to_path_buf(),
        download_mode: DownloadMode::Touch,
        overwrite: OverwritePolicy::Always,
        ..Config::default()
    };
    let downloader = Downloader::connect(config, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    let outcomes = downloader
        .download_url("https://mega.nz/file/WVczzLpB#faIpcuNadIMU4uLyNQ1LfWFhAHBwPewtxxSiTIdeHWI")
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, DownloadStatus::Touched);
    assert!(outcomes[0].path.starts_with(dir.path()));
    assert_eq!(std::fs::metadata(&outcomes[0].path).unwrap().len(), 0);
}
