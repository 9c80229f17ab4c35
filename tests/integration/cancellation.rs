//! Cancelling a job leaves nothing behind.

use crate::common::{LauncherFixture, RELEASES_PATH, job_outcome, list_files, next_event, release_listing};
use launchkit::core::TargetKind;
use launchkit::engine::{CancelOutcome, EngineEvent, JobOutcome, JobState};
use launchkit::test_utils::{StallingServer, zip_bytes};
use std::time::Duration;

async fn stalled_release(fixture_api: &mut mockito::Server) -> (StallingServer, mockito::Mock) {
    let big: Vec<u8> = (0..64 * 1024u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice()), ("data/big.pak", big.as_slice())]);
    let stalling = StallingServer::start(archive[..archive.len() / 2].to_vec(), archive.len() as u64).await;
    let api = fixture_api
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &stalling.url("/client.zip"), &archive))
        .create_async()
        .await;
    (stalling, api)
}

#[tokio::test]
async fn test_cancel_during_download() {
    let mut server = mockito::Server::new_async().await;
    let (_stalling, _api) = stalled_release(&mut server).await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.read_timeout_secs = 60;
    fixture.write("game.exe", b"client v1");
    let (handle, mut rx) = fixture.spawn().await;

    handle.request_check(TargetKind::Client);
    next_event(&mut rx, |e| matches!(e, EngineEvent::Progress { .. })).await;
    assert_eq!(handle.state(TargetKind::Client), JobState::Downloading);

    assert_eq!(handle.cancel(TargetKind::Client), CancelOutcome::Requested);
    assert_eq!(job_outcome(&mut rx, TargetKind::Client).await, JobOutcome::Cancelled);

    assert_eq!(handle.state(TargetKind::Client), JobState::Idle);
    assert!(list_files(&fixture.state_dir().join("downloads")).is_empty());
    assert_eq!(list_files(&fixture.root()), vec!["game.exe"]);
    assert_eq!(handle.cancel(TargetKind::Client), CancelOutcome::NoActiveJob);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancel_while_awaiting_consent_downloads_nothing() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let mut server = mockito::Server::new_async().await;
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &asset_url, &archive))
        .create_async()
        .await;
    let download = server.mock("GET", "/downloads/client.zip").expect(0).create_async().await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.unattended_install = false;
    let (handle, mut rx) = fixture.spawn().await;

    handle.request_check(TargetKind::Client);
    next_event(&mut rx, |e| matches!(e, EngineEvent::ConsentRequested { .. })).await;
    assert_eq!(handle.cancel(TargetKind::Client), CancelOutcome::Requested);
    assert_eq!(job_outcome(&mut rx, TargetKind::Client).await, JobOutcome::Cancelled);

    // A late consent answer has nothing to apply to.
    assert!(!handle.consent(TargetKind::Client, true));
    download.assert_async().await;
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_interrupts_download() {
    let mut server = mockito::Server::new_async().await;
    let (_stalling, _api) = stalled_release(&mut server).await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.read_timeout_secs = 60;
    let (handle, mut rx) = fixture.spawn().await;

    handle.request_check(TargetKind::Client);
    next_event(&mut rx, |e| matches!(e, EngineEvent::Progress { .. })).await;

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown()).await.unwrap().unwrap();
    assert!(list_files(&fixture.state_dir().join("downloads")).is_empty());
    assert!(list_files(&fixture.root()).is_empty());
}
