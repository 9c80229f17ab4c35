//! The `launchkit` binary.

use crate::common::{LauncherFixture, RELEASES_PATH, release_listing};
use launchkit::config::SourceConfig;
use launchkit::test_utils::zip_bytes;
use predicates::prelude::*;

/// Serve a v2.0.0 release; the asset must be fetched exactly `downloads` times.
fn publish(server: &mut mockito::Server, archive: &[u8], downloads: usize) -> (mockito::Mock, mockito::Mock) {
    let asset_url = format!("{}/downloads/client.zip", server.url());
    let api = server
        .mock("GET", RELEASES_PATH)
        .with_body(release_listing("v2.0.0", &asset_url, archive))
        .create();
    let download = server
        .mock("GET", "/downloads/client.zip")
        .with_body(archive)
        .expect(downloads)
        .create();
    (api, download)
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = assert_cmd::Command::cargo_bin("launchkit").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("self-update"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_status_on_fresh_install() {
    let fixture = LauncherFixture::github("http://127.0.0.1:9");
    fixture
        .command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Test Realm"))
        .stdout(predicate::str::contains("not installed"))
        .stdout(predicate::str::contains("example-org/client-releases"));
}

#[test]
fn test_status_json() {
    let fixture = LauncherFixture::github("http://127.0.0.1:9");
    fixture.write("version.txt", b"1.2.0\n");
    let output = fixture.command().args(["status", "--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["server_name"], "Test Realm");
    assert_eq!(report["targets"][0]["target"], "client");
    assert_eq!(report["targets"][0]["version"], "1.2.0");
}

#[test]
fn test_check_reports_available_update() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let mut server = mockito::Server::new();
    let (_api, download) = publish(&mut server, &archive, 0);

    let fixture = LauncherFixture::github(&server.url());
    fixture.write("version.txt", b"1.0.0\n");

    fixture
        .command()
        .args(["check", "--target", "client"])
        .assert()
        .success()
        .stdout(predicate::str::contains("client update available: 1.0.0 → 2.0.0"));

    fixture.command().args(["check", "--target", "client", "--exit-code"]).assert().code(2);
    download.assert();
    assert_eq!(fixture.read("version.txt"), b"1.0.0\n");
}

#[test]
fn test_update_with_yes_installs() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let mut server = mockito::Server::new();
    let (_api, download) = publish(&mut server, &archive, 1);

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.unattended_install = false;
    fixture.write("game.exe", b"client v1");
    fixture.write("characterdata/hero.dat", b"level 60");

    fixture
        .command()
        .args(["update", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("client updated to 2.0.0"));

    download.assert();
    assert_eq!(fixture.read("game.exe"), b"client v2");
    assert_eq!(fixture.read("characterdata/hero.dat"), b"level 60");
    assert_eq!(fixture.read("version.txt"), b"2.0.0\n");
}

#[test]
fn test_update_without_terminal_asks_for_yes() {
    let archive = zip_bytes(&[("game.exe", b"client v2".as_slice())]);
    let mut server = mockito::Server::new();
    let (_api, download) = publish(&mut server, &archive, 0);

    let mut fixture = LauncherFixture::github(&server.url());
    fixture.config.unattended_install = false;
    fixture.write("game.exe", b"client v1");

    fixture
        .command()
        .arg("update")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"))
        .stdout(predicate::str::contains("client update skipped"));

    download.assert();
    assert_eq!(fixture.read("game.exe"), b"client v1");
}

#[test]
fn test_failed_update_exits_nonzero() {
    let mut server = mockito::Server::new();
    let _api = server.mock("GET", RELEASES_PATH).with_status(404).create();

    let fixture = LauncherFixture::github(&server.url());
    fixture
        .command()
        .arg("update")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_self_update_refused_for_source_builds() {
    let mut fixture = LauncherFixture::github("http://127.0.0.1:9");
    fixture.config.launcher = Some(SourceConfig::github("example-org", "launcher", "launchkit"));

    fixture
        .command()
        .arg("self-update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("development build"));
}

#[test]
fn test_invalid_config_is_reported() {
    let mut fixture = LauncherFixture::github("http://127.0.0.1:9");
    fixture.config.protected_folders = vec!["../outside".to_string()];

    fixture
        .command()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}
