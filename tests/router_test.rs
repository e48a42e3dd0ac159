//! Router behaviour against in-memory backends: size-based delegation,
//! rejection of small files and error responses.

mod common;

use common::{router_config, RouterHarness, DESTINATION_BUCKET, SERVER_ID, SOURCE_BUCKET};
use serde_json::json;
use sftp_decrypt::backend::memory::RecordingNotifier;
use sftp_decrypt::backend::StepStatus;
use sftp_decrypt::config::RouterConfig;
use sftp_decrypt::core::router::reject_unconfigured;
use sftp_decrypt::request::env_keys;
use sftp_decrypt::{DecryptError, ObjectLocation, TransferEvent};
use std::sync::Arc;

const GIB: u64 = 1024 * 1024 * 1024;

fn event(key: &str) -> TransferEvent {
    serde_json::from_value(json!({
        "fileLocation": {"bucket": SOURCE_BUCKET, "key": key},
        "serviceMetadata": {
            "executionDetails": {"workflowId": "w-1234567890abcdef0", "executionId": "e-7f1c2d3a"}
        },
        "transferDetails": {"serverId": SERVER_ID, "userName": "alice"},
        "token": "callback-token"
    }))
    .unwrap()
}

fn env_value<'a>(env: &'a [(String, String)], name: &str) -> Option<&'a str> {
    env.iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

#[tokio::test]
async fn test_large_file_is_delegated_without_touching_content() {
    let h = RouterHarness::new(router_config(GIB, None));
    let key = "in/sftp/alice/exports/big.tar.pgp";
    h.store
        .insert_declared(ObjectLocation::new(SOURCE_BUCKET, key), 2 * GIB);

    let response = h.router.handle(&event(key)).await;

    assert_eq!(response.status_code, 202);
    assert_eq!(response.body["message"], "Decryption started in Fargate");
    assert_eq!(response.body["taskArn"], "arn:memory:task/1");
    assert_eq!(response.body["fileSize"], 2 * GIB);
    assert_eq!(response.body["fileSizeMB"], "2048.00");

    let launches = h.launcher.launches();
    assert_eq!(launches.len(), 1);
    let env = &launches[0];
    assert_eq!(env_value(env, env_keys::SOURCE_BUCKET), Some(SOURCE_BUCKET));
    assert_eq!(env_value(env, env_keys::SOURCE_KEY), Some(key));
    assert_eq!(
        env_value(env, env_keys::DESTINATION_BUCKET),
        Some(DESTINATION_BUCKET)
    );
    assert_eq!(
        env_value(env, env_keys::DESTINATION_KEY),
        Some("in/decrypted/alice/exports/big.tar")
    );
    assert_eq!(env_value(env, env_keys::TRANSFER_SERVER_ID), Some(SERVER_ID));
    assert_eq!(
        env_value(env, env_keys::WORKFLOW_ID),
        Some("w-1234567890abcdef0")
    );
    assert_eq!(env_value(env, env_keys::EXECUTION_ID), Some("e-7f1c2d3a"));
    assert_eq!(env_value(env, env_keys::WORKFLOW_TOKEN), Some("callback-token"));

    // The delegated task owns the content and the status report
    assert_eq!(h.store.size_calls(), 1);
    assert_eq!(h.store.fetch_calls(), 0);
    assert_eq!(h.store.put_calls(), 0);
    assert_eq!(h.notifier.attempts(), 0);
}

#[tokio::test]
async fn test_file_exactly_at_threshold_is_delegated() {
    let h = RouterHarness::new(router_config(GIB, None));
    let key = "in/sftp/alice/edge.bin.pgp";
    h.store
        .insert_declared(ObjectLocation::new(SOURCE_BUCKET, key), GIB);

    let response = h.router.handle(&event(key)).await;

    assert_eq!(response.status_code, 202);
    assert_eq!(h.launcher.launches().len(), 1);
}

#[tokio::test]
async fn test_malformed_key_is_rejected_before_any_storage_call() {
    let h = RouterHarness::new(router_config(GIB, None));

    let response = h.router.handle(&event("not/sftp/bob/file.pgp")).await;

    assert_eq!(response.status_code, 400);
    assert_eq!(response.body["error"], "Orchestrator failed");
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .contains("not/sftp/bob/file.pgp"));
    assert_eq!(h.store.size_calls(), 0);
    assert_eq!(h.store.fetch_calls(), 0);
    assert_eq!(h.store.put_calls(), 0);
    assert!(h.launcher.launches().is_empty());

    let callbacks = h.notifier.callbacks();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].status, StepStatus::Failure);
}

#[tokio::test]
async fn test_small_file_is_rejected_and_reported() {
    let h = RouterHarness::new(router_config(GIB, None));
    let key = "in/sftp/alice/small.csv.pgp";
    h.store
        .insert(ObjectLocation::new(SOURCE_BUCKET, key), vec![0u8; 1536 * 1024]);

    let response = h.router.handle(&event(key)).await;

    assert_eq!(response.status_code, 400);
    assert_eq!(
        response.body["message"],
        "File below Fargate threshold, inline processing not implemented"
    );
    assert_eq!(response.body["fileSizeMB"], "1.50");
    assert_eq!(response.body["threshold"], GIB);
    assert!(h.launcher.launches().is_empty());
    assert_eq!(h.store.fetch_calls(), 0);

    let callbacks = h.notifier.callbacks();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].status, StepStatus::Failure);
    assert_eq!(callbacks[0].workflow_id, "w-1234567890abcdef0");
}

#[tokio::test]
async fn test_delegation_failure_is_server_error() {
    let h = RouterHarness::new(router_config(0, None));
    let key = "in/sftp/alice/a.pgp";
    h.store
        .insert(ObjectLocation::new(SOURCE_BUCKET, key), b"x".to_vec());
    h.launcher.fail_launches("No Container Instances were found");

    let response = h.router.handle(&event(key)).await;

    assert_eq!(response.status_code, 500);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .contains("No Container Instances were found"));
    assert_eq!(h.notifier.callbacks()[0].status, StepStatus::Failure);
}

#[tokio::test]
async fn test_missing_object_is_server_error() {
    let h = RouterHarness::new(router_config(GIB, None));

    let response = h.router.handle(&event("in/sftp/alice/vanished.pgp")).await;

    assert_eq!(response.status_code, 500);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to get file size"));
    assert_eq!(h.notifier.attempts(), 1);
}

#[tokio::test]
async fn test_event_without_location_is_client_error() {
    let h = RouterHarness::new(router_config(GIB, None));
    let event: TransferEvent = serde_json::from_value(json!({
        "serviceMetadata": {"executionDetails": {"workflowId": "w-1", "executionId": "e-1"}},
        "token": "t"
    }))
    .unwrap();

    let response = h.router.handle(&event).await;

    assert_eq!(response.status_code, 400);
    assert_eq!(
        response.body["message"],
        "No file location provided in event"
    );
    assert_eq!(h.store.size_calls(), 0);
    assert_eq!(h.notifier.callbacks().len(), 1);
}

#[tokio::test]
async fn test_initial_location_and_configured_server_are_used() {
    let h = RouterHarness::new(router_config(0, Some("s-from-config")));
    let key = "in/sftp/bob/late.pgp";
    h.store
        .insert(ObjectLocation::new(SOURCE_BUCKET, key), b"x".to_vec());
    let event: TransferEvent = serde_json::from_value(json!({
        "initialFileLocation": {"bucket": SOURCE_BUCKET, "key": key}
    }))
    .unwrap();

    let response = h.router.handle(&event).await;

    assert_eq!(response.status_code, 202);
    let env = &h.launcher.launches()[0];
    assert_eq!(env_value(env, env_keys::SOURCE_KEY), Some(key));
    assert_eq!(
        env_value(env, env_keys::TRANSFER_SERVER_ID),
        Some("s-from-config")
    );
    assert_eq!(env_value(env, env_keys::WORKFLOW_TOKEN), None);
    assert_eq!(h.notifier.attempts(), 0);
}

#[tokio::test]
async fn test_missing_server_id_is_server_error() {
    let h = RouterHarness::new(router_config(0, None));
    let key = "in/sftp/bob/orphan.pgp";
    h.store
        .insert(ObjectLocation::new(SOURCE_BUCKET, key), b"x".to_vec());
    let event: TransferEvent = serde_json::from_value(json!({
        "fileLocation": {"bucket": SOURCE_BUCKET, "key": key}
    }))
    .unwrap();

    let response = h.router.handle(&event).await;

    assert_eq!(response.status_code, 500);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .contains("Server ID not found"));
    assert!(h.launcher.launches().is_empty());
    // No workflow context, so nothing to report to
    assert_eq!(h.notifier.attempts(), 0);
}

#[tokio::test]
async fn test_unconfigured_router_still_reports_failure() {
    let notifier = RecordingNotifier::new();
    // Everything but the cluster name
    let env = [
        ("TASK_DEFINITION", "decrypt-task:3"),
        ("SUBNET_IDS", "subnet-a"),
        ("SECURITY_GROUP_ID", "sg-0abc"),
        ("DESTINATION_BUCKET", DESTINATION_BUCKET),
    ];
    let err = RouterConfig::from_lookup(|name: &str| {
        env.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
    .unwrap_err();
    assert!(matches!(err, DecryptError::Config(_)));

    let response = reject_unconfigured(
        Arc::new(notifier.clone()),
        &event("in/sftp/alice/a.pgp"),
        &err,
    )
    .await;

    assert_eq!(response.status_code, 500);
    assert_eq!(response.body["error"], "Orchestrator failed");
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .contains("ECS_CLUSTER_NAME"));

    let callbacks = notifier.callbacks();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].status, StepStatus::Failure);
    assert_eq!(callbacks[0].execution_id, "e-7f1c2d3a");
    assert_eq!(callbacks[0].token, "callback-token");
}
