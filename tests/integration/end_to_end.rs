//! Full client updates through the GitHub release API.

use crate::common::{
    LauncherFixture, RELEASES_PATH, job_outcome, list_files, next_event, release_entry, release_listing,
};
use launchkit::core::{ErrorKind, TargetKind};
use launchkit::engine::{CheckResult, EngineEvent, JobOutcome, JobState};
use launchkit::test_utils::zip_bytes;
use serde_json::json;

fn client_v2() -> Vec<u8> {
    zip_bytes(&[
        ("game.exe", b"client v2".as_slice()),
        ("data/", b""),
        ("data/world.pak", b"world v2"),
        ("minimap/", b""),
        ("minimap/default.png", b"shipped minimap"),
    ])
}

#[tokio::test]
async fn test_update_replaces_install_and_keeps_user_folders() {
    let archive = client_v2();
    let mut server = mockito::Server::new_async().await;
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let api = server
        .mock("GET", RELEASES_PATH)
        .match_header("accept", "application/vnd.github+json")
        .with_body(release_listing("v2.0.0", &asset_url, &archive))
        .create_async()
        .await;
    let download = server.mock("GET", "/downloads/client.zip").with_body(archive).create_async().await;

    let fixture = LauncherFixture::github(&server.url());
    fixture.write("version.txt", b"1.0.0\n");
    fixture.write("game.exe", b"client v1");
    fixture.write("data/old.pak", b"stale");
    fixture.write("minimap/area1.png", b"explored");
    fixture.write("conf/settings.ini", b"volume=3");
    fixture.write("characterdata/hero.dat", b"level 60");

    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    let outcome = job_outcome(&mut rx, TargetKind::Client).await;
    assert_eq!(
        outcome,
        JobOutcome::Installed {
            version: "2.0.0".to_string()
        }
    );
    api.assert_async().await;
    download.assert_async().await;

    assert_eq!(
        list_files(&fixture.root()),
        vec![
            "characterdata/hero.dat",
            "conf/settings.ini",
            "data/world.pak",
            "game.exe",
            "minimap/area1.png",
            "version.txt",
        ]
    );
    assert_eq!(fixture.read("game.exe"), b"client v2");
    assert_eq!(fixture.read("minimap/area1.png"), b"explored");
    assert_eq!(fixture.read("conf/settings.ini"), b"volume=3");
    assert_eq!(fixture.read("characterdata/hero.dat"), b"level 60");

    // State survives a restart of the engine.
    handle.shutdown().await.unwrap();
    let (handle, mut rx) = fixture.spawn().await;
    assert_eq!(handle.install_state(TargetKind::Client).unwrap().version.as_deref(), Some("2.0.0"));
    assert!(handle.install_state(TargetKind::Client).unwrap().last_update.is_some());

    handle.request_check(TargetKind::Client);
    let event = next_event(&mut rx, |e| matches!(e, EngineEvent::CheckCompleted { .. })).await;
    assert!(matches!(
        event,
        EngineEvent::CheckCompleted {
            result: CheckResult::UpToDate { .. },
            ..
        }
    ));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_first_install_into_empty_root() {
    let archive = client_v2();
    let mut server = mockito::Server::new_async().await;
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &asset_url, &archive))
        .create_async()
        .await;
    let _download = server.mock("GET", "/downloads/client.zip").with_body(archive).create_async().await;

    let fixture = LauncherFixture::github(&server.url());
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    let event = next_event(&mut rx, |e| matches!(e, EngineEvent::CheckCompleted { .. })).await;
    assert_eq!(
        event,
        EngineEvent::CheckCompleted {
            target: TargetKind::Client,
            result: CheckResult::UpdateAvailable {
                current: None,
                available: "2.0.0".to_string(),
            },
        }
    );
    assert!(matches!(job_outcome(&mut rx, TargetKind::Client).await, JobOutcome::Installed { .. }));
    assert_eq!(fixture.read("minimap/default.png"), b"shipped minimap");
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_consent_flow_reports_release_notes() {
    let archive = client_v2();
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
    fixture.write("version.txt", b"1.0.0");

    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    let event = next_event(&mut rx, |e| matches!(e, EngineEvent::ConsentRequested { .. })).await;
    let EngineEvent::ConsentRequested {
        current,
        available,
        description,
        ..
    } = event
    else {
        unreachable!()
    };
    assert_eq!(current.as_deref(), Some("1.0.0"));
    assert_eq!(available, "2.0.0");
    assert_eq!(description, "Release notes for v2.0.0");

    assert!(handle.consent(TargetKind::Client, true));
    let mut saw_progress = false;
    loop {
        match next_event(&mut rx, |_| true).await {
            EngineEvent::Progress {
                total,
                ..
            } => {
                saw_progress = true;
                assert!(total.is_some());
            }
            EngineEvent::JobCompleted {
                outcome,
                ..
            } => {
                assert!(matches!(outcome, JobOutcome::Installed { .. }));
                break;
            }
            _ => {}
        }
    }
    assert!(saw_progress);
    assert_eq!(handle.state(TargetKind::Client), JobState::Idle);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_prereleases_and_drafts_are_skipped_by_default() {
    let stable = client_v2();
    let beta = zip_bytes(&[("game.exe", b"beta".as_slice())]);
    let mut server = mockito::Server::new_async().await;
    let stable_url = format!("{}/downloads/client.zip", server.url());
    let beta_url = format!("{}/downloads/beta.zip", server.url());

    let mut draft = release_entry("v4.0.0", &beta_url, &beta, false);
    draft["draft"] = json!(true);
    let listing = json!([
        release_entry("v3.0.0-beta.1", &beta_url, &beta, true),
        draft,
        release_entry("v2.0.0", &stable_url, &stable, false),
    ]);
    let _api = server.mock("GET", RELEASES_PATH).with_body(listing.to_string()).create_async().await;
    let _download = server.mock("GET", "/downloads/client.zip").with_body(stable).create_async().await;

    let fixture = LauncherFixture::github(&server.url());
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    assert_eq!(
        job_outcome(&mut rx, TargetKind::Client).await,
        JobOutcome::Installed {
            version: "2.0.0".to_string()
        }
    );
    assert_eq!(fixture.read("game.exe"), b"client v2");
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_private_repository_downloads_with_token() {
    let archive = client_v2();
    let mut server = mockito::Server::new_async().await;
    let asset_api = format!("{}/repos/example-org/client-releases/releases/assets/42", server.url());
    let mut listing: serde_json::Value = serde_json::from_str(&release_listing(
        "v2.0.0",
        "https://github.com/example-org/client-releases/releases/download/v2.0.0/client.zip",
        &archive,
    ))
    .unwrap();
    listing[0]["assets"][0]["url"] = json!(asset_api);

    let _api = server
        .mock("GET", RELEASES_PATH)
        .match_header("authorization", "Bearer private-token")
        .with_body(listing.to_string())
        .create_async()
        .await;
    let download = server
        .mock("GET", "/repos/example-org/client-releases/releases/assets/42")
        .match_header("authorization", "Bearer private-token")
        .match_header("accept", "application/octet-stream")
        .with_body(archive)
        .create_async()
        .await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.token = Some("private-token".to_string());
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    assert_eq!(
        job_outcome(&mut rx, TargetKind::Client).await,
        JobOutcome::Installed {
            version: "2.0.0".to_string()
        }
    );
    download.assert_async().await;
    assert_eq!(fixture.read("game.exe"), b"client v2");
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remote_config_pins_release_and_adds_protected_folders() {
    let archive = client_v2();
    let mut server = mockito::Server::new_async().await;
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let _remote = server
        .mock("GET", "/launcher_config.json")
        .with_body(r#"{"release_tag":"v1.5.0","protected_folders":["screenshots"]}"#)
        .create_async()
        .await;
    let latest = server.mock("GET", RELEASES_PATH).expect(0).create_async().await;
    let pinned = server
        .mock("GET", format!("{RELEASES_PATH}/tags/v1.5.0").as_str())
        .with_body(release_entry("v1.5.0", &asset_url, &archive, false).to_string())
        .create_async()
        .await;
    let _download = server.mock("GET", "/downloads/client.zip").with_body(archive).create_async().await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.remote_config_url = Some(format!("{}/launcher_config.json", server.url()));
    fixture.write("version.txt", b"1.0.0\n");
    fixture.write("game.exe", b"client v1");
    fixture.write("screenshots/boss.png", b"rare drop");
    fixture.write("conf/settings.ini", b"volume=3");

    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    assert_eq!(
        job_outcome(&mut rx, TargetKind::Client).await,
        JobOutcome::Installed {
            version: "1.5.0".to_string()
        }
    );
    pinned.assert_async().await;
    latest.assert_async().await;
    assert_eq!(fixture.read("screenshots/boss.png"), b"rare drop");
    assert_eq!(fixture.read("conf/settings.ini"), b"volume=3");
    assert_eq!(fixture.read("game.exe"), b"client v2");
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remote_config_with_unsafe_folder_fails_the_check() {
    let archive = client_v2();
    let mut server = mockito::Server::new_async().await;
    let _remote = server
        .mock("GET", "/launcher_config.json")
        .with_body("protected_folders = conf, ../../home\n")
        .create_async()
        .await;
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &format!("{}/downloads/client.zip", server.url()), &archive))
        .create_async()
        .await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.remote_config_url = Some(format!("{}/launcher_config.json", server.url()));
    fixture.write("version.txt", b"1.0.0\n");
    fixture.write("game.exe", b"client v1");

    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    let event = next_event(&mut rx, |e| matches!(e, EngineEvent::CheckCompleted { .. })).await;
    assert!(matches!(
        event,
        EngineEvent::CheckCompleted {
            result: CheckResult::Failed(ref failure),
            ..
        } if failure.kind == ErrorKind::InvalidConfig
    ));
    assert_eq!(handle.state(TargetKind::Client), JobState::CheckFailed);
    assert_eq!(fixture.read("game.exe"), b"client v1");
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_remote_config_falls_back_to_local_source() {
    let archive = client_v2();
    let mut server = mockito::Server::new_async().await;
    let _remote = server.mock("GET", "/launcher_config.json").with_status(404).create_async().await;
    let _api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &format!("{}/downloads/client.zip", server.url()), &archive))
        .create_async()
        .await;
    let _download = server.mock("GET", "/downloads/client.zip").with_body(archive).create_async().await;

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.remote_config_url = Some(format!("{}/launcher_config.json", server.url()));
    let (handle, mut rx) = fixture.spawn().await;
    handle.request_check(TargetKind::Client);

    assert_eq!(
        job_outcome(&mut rx, TargetKind::Client).await,
        JobOutcome::Installed {
            version: "2.0.0".to_string()
        }
    );
    handle.shutdown().await.unwrap();
}
