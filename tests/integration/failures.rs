//! Failures anywhere in the pipeline leave the existing install as it was.

use crate::common::{LauncherFixture, RELEASES_PATH, job_outcome, list_files, next_event, release_listing};
use launchkit::core::{ErrorKind, TargetKind};
use launchkit::engine::{CheckResult, EngineEvent, JobOutcome, JobState};
use launchkit::state::StateStore;
use launchkit::test_utils::{StallingServer, zip_bytes};
use std::time::Duration;

fn seed_install(fixture: &LauncherFixture) -> Vec<String> {
    fixture.write("version.txt", b"1.0.0\n");
    fixture.write("game.exe", b"client v1");
    fixture.write("conf/settings.ini", b"volume=3");
    list_files(&fixture.root())
}

fn failed_kind(outcome: JobOutcome) -> ErrorKind {
    match outcome {
        JobOutcome::Failed(failure) => failure.kind,
        other => panic!("expected a failed job, got {other:?}"),
    }
}

fn assert_untouched(fixture: &LauncherFixture, before: &[String]) {
    assert_eq!(list_files(&fixture.root()), before);
    assert_eq!(fixture.read("game.exe"), b"client v1");
    assert_eq!(fixture.read("conf/settings.ini"), b"volume=3");
    let downloads = fixture.state_dir().join("downloads");
    assert!(list_files(&downloads).is_empty(), "leftover downloads: {:?}", list_files(&downloads));
}

#[tokio::test]
async fn test_checksum_mismatch_is_integrity_error() {
    let served = zip_bytes(&[("game.exe", b"tampered".as_slice())]);
    let published = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let mut server = mockito::Server::new_async().await;
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &asset_url, &published))
        .create_async()
        .await;
    let _download = server.mock("GET", "/downloads/client.zip").with_body(served).create_async().await;

    let fixture = LauncherFixture::github(&server.url());
    let before = seed_install(&fixture);
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    assert_eq!(failed_kind(job_outcome(&mut rx, TargetKind::Client).await), ErrorKind::Integrity);
    assert_eq!(handle.state(TargetKind::Client), JobState::Failed);
    assert_eq!(handle.install_state(TargetKind::Client).unwrap().version.as_deref(), Some("1.0.0"));
    assert_untouched(&fixture, &before);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_archive_is_rejected_before_install() {
    let garbage = b"this is not a zip archive".to_vec();
    let mut server = mockito::Server::new_async().await;
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &asset_url, &garbage))
        .create_async()
        .await;
    let _download = server.mock("GET", "/downloads/client.zip").with_body(garbage).create_async().await;

    let fixture = LauncherFixture::github(&server.url());
    let before = seed_install(&fixture);
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    assert_eq!(failed_kind(job_outcome(&mut rx, TargetKind::Client).await), ErrorKind::CorruptArchive);
    assert_untouched(&fixture, &before);

    // Protected data was restored, so its quarantine is gone.
    let quarantine = fixture.state_dir().join("quarantine").join("client");
    assert!(list_files(&quarantine).is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connection_drop_mid_body_is_network_error() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let stalling = StallingServer::start_truncated(archive[..10].to_vec(), archive.len() as u64).await;

    let mut server = mockito::Server::new_async().await;
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &stalling.url("/client.zip"), &archive))
        .create_async()
        .await;

    let fixture = LauncherFixture::github(&server.url());
    let before = seed_install(&fixture);
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    assert_eq!(failed_kind(job_outcome(&mut rx, TargetKind::Client).await), ErrorKind::Network);
    assert_untouched(&fixture, &before);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stalled_transfer_hits_read_timeout() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let stalling = StallingServer::start(archive[..10].to_vec(), archive.len() as u64).await;

    let mut server = mockito::Server::new_async().await;
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &stalling.url("/client.zip"), &archive))
        .create_async()
        .await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.read_timeout_secs = 1;
    let before = seed_install(&fixture);
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    assert_eq!(failed_kind(job_outcome(&mut rx, TargetKind::Client).await), ErrorKind::Network);
    assert_untouched(&fixture, &before);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rate_limit_carries_retry_hint() {
    let mut server = mockito::Server::new_async().await;
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_status(403)
        .with_header("x-ratelimit-remaining", "0")
        .with_header("retry-after", "120")
        .with_body(r#"{"message":"API rate limit exceeded"}"#)
        .create_async()
        .await;

    let fixture = LauncherFixture::github(&server.url());
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    let event = next_event(&mut rx, |e| matches!(e, EngineEvent::CheckCompleted { .. })).await;
    let EngineEvent::CheckCompleted {
        result: CheckResult::Failed(failure),
        ..
    } = event
    else {
        panic!("expected a failed check, got {event:?}");
    };
    assert_eq!(failure.kind, ErrorKind::RateLimited);
    assert_eq!(failure.retry_after, Some(Duration::from_secs(120)));
    assert_eq!(handle.state(TargetKind::Client), JobState::CheckFailed);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_asset_is_not_found() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let mut server = mockito::Server::new_async().await;
    let mut listing: serde_json::Value =
        serde_json::from_str(&release_listing("v2.0.0", "http://unused/client.zip", &archive)).unwrap();
    listing[0]["assets"][0]["name"] = serde_json::json!("client-linux.zip");
    let _api = server.mock("GET", RELEASES_PATH).with_body(listing.to_string()).create_async().await;

    let fixture = LauncherFixture::github(&server.url());
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    let event = next_event(&mut rx, |e| matches!(e, EngineEvent::CheckCompleted { .. })).await;
    assert!(matches!(
        event,
        EngineEvent::CheckCompleted {
            result: CheckResult::Failed(ref failure),
            ..
        } if failure.kind == ErrorKind::NotFound
    ));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restore_failure_keeps_quarantine_and_version() {
    // The new release ships a plain file where a protected folder's parent used to be.
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice()), ("saves", b"not a directory")]);
    let mut server = mockito::Server::new_async().await;
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &asset_url, &archive))
        .create_async()
        .await;
    let _download = server.mock("GET", "/downloads/client.zip").with_body(archive).create_async().await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.protected_folders = vec!["saves/slot1".to_string()];
    fixture.write("version.txt", b"1.0.0\n");
    fixture.write("game.exe", b"client v1");
    fixture.write("saves/slot1/knight.dat", b"level 80");

    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    let failure = match job_outcome(&mut rx, TargetKind::Client).await {
        JobOutcome::Failed(failure) => failure,
        other => panic!("expected a failed job, got {other:?}"),
    };
    assert_eq!(failure.kind, ErrorKind::ProtectionRestore);
    let quarantine = failure.quarantine.expect("failure names the quarantine");
    assert!(quarantine.starts_with(fixture.state_dir().join("quarantine").join("client")));
    assert_eq!(
        std::fs::read(quarantine.join("data/saves/slot1/knight.dat")).unwrap(),
        b"level 80"
    );

    assert_eq!(handle.state(TargetKind::Client), JobState::Failed);
    let install = handle.install_state(TargetKind::Client).unwrap();
    assert_eq!(install.version.as_deref(), Some("1.0.0"));
    assert!(install.last_update.is_none());
    handle.shutdown().await.unwrap();

    let persisted = StateStore::new(fixture.state_dir()).load(TargetKind::Client, &fixture.root()).await.unwrap();
    assert_eq!(persisted.version.as_deref(), Some("1.0.0"));
}
