//! One job per target: triggers coalesce, and processes serialize on the job lock.

use crate::common::{LauncherFixture, RELEASES_PATH, job_outcome, next_event, release_listing};
use launchkit::core::TargetKind;
use launchkit::engine::{CancelOutcome, EngineEvent, JobOutcome, TriggerOutcome};
use launchkit::test_utils::{StallingServer, zip_bytes};
use std::sync::Arc;

#[tokio::test]
async fn test_triggers_coalesce_while_downloading() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let stalling = StallingServer::start(archive[..archive.len() / 2].to_vec(), archive.len() as u64).await;
    let mut server = mockito::Server::new_async().await;
    let api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &stalling.url("/client.zip"), &archive))
        .expect(1)
        .create_async()
        .await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.read_timeout_secs = 60;
    let (handle, mut rx) = fixture.spawn().await;

    assert_eq!(handle.request_check(TargetKind::Client), TriggerOutcome::Started);
    next_event(&mut rx, |e| matches!(e, EngineEvent::Progress { .. })).await;

    for _ in 0..5 {
        assert_eq!(handle.request_check(TargetKind::Client), TriggerOutcome::Coalesced);
    }
    // The launcher target is independent of the client job.
    assert_eq!(handle.request_check(TargetKind::Launcher), TriggerOutcome::Started);

    assert_eq!(handle.cancel(TargetKind::Client), CancelOutcome::Requested);
    assert_eq!(job_outcome(&mut rx, TargetKind::Client).await, JobOutcome::Cancelled);
    api.assert_async().await;
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_simultaneous_triggers_start_one_job() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let mut server = mockito::Server::new_async().await;
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &asset_url, &archive))
        .create_async()
        .await;
    let _download = server.mock("GET", "/downloads/client.zip").with_body(archive).create_async().await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.unattended_install = false;
    let (handle, mut rx) = fixture.spawn().await;
    let handle = Arc::new(handle);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move { handle.request_check(TargetKind::Client) }));
    }
    let mut started = 0;
    for task in tasks {
        if task.await.unwrap() == TriggerOutcome::Started {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    next_event(&mut rx, |e| matches!(e, EngineEvent::ConsentRequested { .. })).await;
    assert!(handle.consent(TargetKind::Client, false));
    assert_eq!(job_outcome(&mut rx, TargetKind::Client).await, JobOutcome::Declined);

    let handle = Arc::try_unwrap(handle).ok().unwrap();
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_two_launchers_share_one_install() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let mut server = mockito::Server::new_async().await;
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &asset_url, &archive))
        .expect(2)
        .create_async()
        .await;
    let download = server
        .mock("GET", "/downloads/client.zip")
        .with_body(archive)
        .expect(1)
        .create_async()
        .await;

    let fixture = LauncherFixture::github(&server.url());
    fixture.write("conf/settings.ini", b"volume=3");
    let (first, mut first_rx) = fixture.spawn().await;
    let (second, mut second_rx) = fixture.spawn().await;

    first.request_check(TargetKind::Client);
    second.request_check(TargetKind::Client);

    let installed = JobOutcome::Installed {
        version: "2.0.0".to_string(),
    };
    assert_eq!(job_outcome(&mut first_rx, TargetKind::Client).await, installed);
    assert_eq!(job_outcome(&mut second_rx, TargetKind::Client).await, installed);

    download.assert_async().await;
    assert_eq!(fixture.read("game.exe"), b"client v2");
    assert_eq!(fixture.read("conf/settings.ini"), b"volume=3");

    first.shutdown().await.unwrap();
    second.shutdown().await.unwrap();
}
