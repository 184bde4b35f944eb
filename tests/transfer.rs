mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use cfw_updater::TransferError;
use cfw_updater::io::{HttpTransfer, Transfer};
use cfw_updater::power::NoopInhibitor;
use cfw_updater::probe::probe_version;
use cfw_updater::zip::extract_staged;

use common::{CountingInhibitor, Route, TestServer, tree, unreachable_url, zip_bytes};

const AGENT: &str = "TheOtherSide-Updater/1.0";

fn transfer() -> HttpTransfer {
    HttpTransfer::new(AGENT, Arc::new(NoopInhibitor))
}

#[tokio::test]
async fn test_download_then_extract_reproduces_tree() {
    let archive = zip_bytes(&[
        ("atmosphere/", None),
        ("atmosphere/package3", Some(&b"pkg3"[..])),
        ("bootloader/payloads/fusee.bin", Some(&b"fusee"[..])),
        ("hbmenu.nro", Some(&b"menu"[..])),
    ]);
    let server = TestServer::start(vec![("/ams.zip", Route::Body(200, archive.clone()))]).await;

    let dir = tempfile::tempdir().unwrap();
    let staged = dir.path().join("ams.zip");
    let root = dir.path().join("sd");

    let written = transfer()
        .fetch(&server.url("/ams.zip"), &staged, None)
        .await
        .unwrap();
    assert_eq!(written, archive.len() as u64);
    assert_eq!(std::fs::read(&staged).unwrap(), archive);

    let report = extract_staged(&staged, &root).await.unwrap();
    assert_eq!(report.files, 3);
    assert!(!staged.exists());
    assert_eq!(
        tree(&root),
        [
            "atmosphere/",
            "atmosphere/package3",
            "bootloader/",
            "bootloader/payloads/",
            "bootloader/payloads/fusee.bin",
            "hbmenu.nro",
        ]
    );
    assert_eq!(std::fs::read(root.join("hbmenu.nro")).unwrap(), b"menu");
}

#[tokio::test]
async fn test_sends_user_agent_and_follows_redirects() {
    let server = TestServer::start(vec![
        ("/latest", Route::Redirect("/v2/file.bin".to_string())),
        ("/v2/file.bin", Route::Body(200, b"payload".to_vec())),
    ])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");
    transfer()
        .fetch(&server.url("/latest"), &dest, None)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    let hits = server.hits();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|(_, agent)| agent == AGENT));
}

#[tokio::test]
async fn test_error_status_fails_and_removes_partial_file() {
    let server = TestServer::start(vec![("/gone.zip", Route::Body(404, b"nope".to_vec()))]).await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("gone.zip");
    let err = transfer()
        .fetch(&server.url("/gone.zip"), &dest, None)
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Status(status) if status.as_u16() == 404));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_unreachable_host() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("x.zip");

    let err = transfer()
        .fetch(&unreachable_url().await, &dest, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Network(_)));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_uncreatable_destination() {
    let server = TestServer::start(vec![("/a", Route::Body(200, b"a".to_vec()))]).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("no/such/dir/a");

    let err = transfer()
        .fetch(&server.url("/a"), &dest, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Create { .. }));
    // the file is opened before any request goes out
    assert!(server.hits().is_empty());
}

#[tokio::test]
async fn test_progress_reports_and_releases_sleep_lock() {
    let body = vec![7u8; 64 * 1024];
    let server = TestServer::start(vec![("/big.bin", Route::Body(200, body.clone()))]).await;

    let inhibitor = CountingInhibitor::default();
    let acquired = inhibitor.acquired.clone();
    let released = inhibitor.released.clone();
    let transfer = HttpTransfer::new(AGENT, Arc::new(inhibitor));

    let dir = tempfile::tempdir().unwrap();
    let mut seen = Vec::new();
    let mut progress = |done: u64, total: u64| seen.push((done, total));
    transfer
        .fetch(&server.url("/big.bin"), &dir.path().join("big.bin"), Some(&mut progress))
        .await
        .unwrap();

    assert_eq!(seen.last(), Some(&(body.len() as u64, body.len() as u64)));
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(acquired.load(Ordering::SeqCst), 1);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    // released on the failure path too
    let mut ignore = |_: u64, _: u64| {};
    let failed = transfer
        .fetch(&unreachable_url().await, &dir.path().join("x"), Some(&mut ignore))
        .await;
    assert!(failed.is_err());
    assert_eq!(acquired.load(Ordering::SeqCst), 2);
    assert_eq!(released.load(Ordering::SeqCst), 2);

    // quiet transfers leave sleep alone
    transfer
        .fetch(&server.url("/big.bin"), &dir.path().join("quiet.bin"), None)
        .await
        .unwrap();
    assert_eq!(acquired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_probe_against_server() {
    let server = TestServer::start(vec![
        (
            "/repos/hekate/releases/latest",
            Route::Body(200, br#"{"id":1,"tag_name":"v6.4.2","draft":false}"#.to_vec()),
        ),
        ("/repos/limited/releases/latest", Route::Body(403, b"{}".to_vec())),
    ])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("temp.json");
    let transfer = transfer();

    let tag = probe_version(&transfer, &server.url("/repos/hekate/releases/latest"), &scratch).await;
    assert_eq!(tag, "v6.4.2");
    assert!(!scratch.exists());

    let tag = probe_version(&transfer, &server.url("/repos/limited/releases/latest"), &scratch).await;
    assert_eq!(tag, "Latest");

    let tag = probe_version(&transfer, &unreachable_url().await, &scratch).await;
    assert_eq!(tag, "Latest");
}
