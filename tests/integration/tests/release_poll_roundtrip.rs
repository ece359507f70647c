#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use goosebot_agent::{GooseCliConfig, GooseCliInvoker};
use goosebot_core::ScratchSlot;
use goosebot_runtime::{
    run_release_poll_cycle, start_release_poll_scheduler, ReleaseBodyKind, ReleaseDelivery,
    ReleasePollConfig, RELEASE_BLOCK_MISSING_MESSAGE,
};
use goosebot_slack_runtime::SlackApiClient;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::{tempdir, TempDir};

fn write_goose_script(root: &Path, body: &str) -> PathBuf {
    let path = root.join("goose");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write goose script");
    let mut permissions = fs::metadata(&path).expect("script metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("chmod goose script");
    path
}

fn goose_invoker(script: &Path) -> GooseCliInvoker {
    GooseCliInvoker::new(GooseCliConfig {
        executable: script.display().to_string(),
        extra_args: Vec::new(),
        timeout: Some(Duration::from_secs(10)),
    })
}

fn slack_client(server: &MockServer) -> SlackApiClient {
    SlackApiClient::new(
        server.base_url(),
        "xapp-test".to_string(),
        "xoxb-test".to_string(),
        3_000,
        2,
        5,
    )
    .expect("slack client")
}

fn poll_config(temp: &TempDir, channel: Option<&str>) -> ReleasePollConfig {
    ReleasePollConfig {
        instruction: "grab the latest release".to_string(),
        interval: Duration::from_millis(50),
        scratch_slot: ScratchSlot::new(temp.path().join("output/OKD-release-output.txt")),
        broadcast_channel_id: channel.map(str::to_string),
    }
}

#[tokio::test]
async fn integration_release_cycle_posts_block_from_scripted_goose() {
    let temp = tempdir().expect("tempdir");
    let script = write_goose_script(
        temp.path(),
        r#"[ "$1" = "run" ] || exit 3
printf 'calling LatestRelease...\n<slack>\n*OKD Release: 4.20.0-okd-scos.ec.1*\n*Accepted*\n</slack>\ndone\n'"#,
    );
    let server = MockServer::start();
    let post = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("authorization", "Bearer xoxb-test")
            .body_includes("\"channel\":\"C-RELEASES\"")
            .body_includes("OKD Release: 4.20.0-okd-scos.ec.1");
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C-RELEASES", "ts": "1700000000.000100"}));
    });

    let config = poll_config(&temp, Some("C-RELEASES"));
    let report = run_release_poll_cycle(
        &config,
        &goose_invoker(&script),
        &slack_client(&server),
        1,
    )
    .await;

    post.assert();
    assert_eq!(report.body_kind, ReleaseBodyKind::Summary);
    assert_eq!(
        report.body,
        "*OKD Release: 4.20.0-okd-scos.ec.1*\n*Accepted*"
    );
    assert_eq!(
        report.delivery,
        ReleaseDelivery::Sent {
            ts: "1700000000.000100".to_string()
        }
    );
    let persisted = config.scratch_slot.read().expect("scratch slot");
    assert!(persisted.starts_with("calling LatestRelease..."));
    assert!(persisted.ends_with("done"));
}

#[tokio::test]
async fn integration_release_cycle_posts_fallback_when_block_missing() {
    let temp = tempdir().expect("tempdir");
    let script = write_goose_script(temp.path(), "echo 'no summary this time'");
    let server = MockServer::start();
    let post = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes(RELEASE_BLOCK_MISSING_MESSAGE);
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C1", "ts": "2.0"}));
    });

    let config = poll_config(&temp, Some("C1"));
    let report = run_release_poll_cycle(
        &config,
        &goose_invoker(&script),
        &slack_client(&server),
        1,
    )
    .await;

    post.assert();
    assert_eq!(report.body_kind, ReleaseBodyKind::MissingBlock);
}

#[tokio::test]
async fn integration_release_cycle_without_channel_only_writes_scratch_slot() {
    let temp = tempdir().expect("tempdir");
    let script = write_goose_script(temp.path(), "echo '<slack>quiet</slack>'");
    let server = MockServer::start();
    let post = server.mock(|when, then| {
        when.method(POST).path("/chat.postMessage");
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C1", "ts": "3.0"}));
    });

    let config = poll_config(&temp, None);
    let report = run_release_poll_cycle(
        &config,
        &goose_invoker(&script),
        &slack_client(&server),
        1,
    )
    .await;

    post.assert_calls(0);
    assert_eq!(report.delivery, ReleaseDelivery::Suppressed);
    assert_eq!(
        config.scratch_slot.read().expect("scratch slot"),
        "<slack>quiet</slack>"
    );
}

#[tokio::test]
async fn integration_release_scheduler_keeps_posting_until_shutdown() {
    let temp = tempdir().expect("tempdir");
    let script = write_goose_script(temp.path(), "echo '<slack>tick</slack>'");
    let server = MockServer::start();
    let post = server.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("\"text\":\"tick\"");
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C1", "ts": "4.0"}));
    });

    let mut handle = start_release_poll_scheduler(
        poll_config(&temp, Some("C1")),
        Arc::new(goose_invoker(&script)),
        Arc::new(slack_client(&server)),
    )
    .expect("start scheduler");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while post.calls() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.shutdown().await;

    assert!(post.calls() >= 2);
    assert!(!handle.is_running());
}
