//! Webhook and beacon transports against a local HTTP stub

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use secrecy::SecretString;
use serde_json::{json, Map};

use deploy_commander::errors::DeployError;
use deploy_commander::models::{DeployMethod, Server};
use deploy_commander::transport::{BeaconTransport, FileMap, Operation, Transport, WebhookTransport};

use crate::common::HttpStub;

fn webhook_server(url: &str) -> Server {
    let mut server = Server::new(1, "Shop", "https://shop.test");
    server.webhook_url = Some(format!("{}/hooks/deploy", url));
    server.webhook_secret = Some(SecretString::from("shared-secret".to_string()));
    server.branch = Some("release".to_string());
    server
}

fn beacon_server(url: &str) -> Server {
    let mut server = Server::new(2, "Blog", "https://blog.test");
    server.deploy_method = DeployMethod::Beacon;
    server.beacon_url = Some(format!("{}/beacon", url));
    server.beacon_key = Some(SecretString::from("beacon-key".to_string()));
    server
}

#[tokio::test]
async fn test_webhook_posts_trigger_payload() {
    let stub = HttpStub::start(vec![(200, r#"{"queued":true}"#.to_string())]).await;
    let server = webhook_server(&stub.url);
    let transport = WebhookTransport::new(Duration::from_secs(5)).unwrap();

    let output = transport.execute(&server, &Operation::SyncSource).await.unwrap();
    assert!(output.succeeded());
    assert_eq!(
        output.output,
        format!("Webhook POST to {}/hooks/deploy\nHTTP 200\n\n{{\"queued\":true}}", stub.url)
    );

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/hooks/deploy");
    assert_eq!(request.headers.get("x-deploy-secret").map(String::as_str), Some("shared-secret"));
    assert_eq!(request.headers.get("accept").map(String::as_str), Some("application/json"));
    assert_eq!(request.json(), json!({"server": "https://shop.test", "branch": "release"}));
}

#[tokio::test]
async fn test_webhook_non_success_is_transport_error() {
    let stub = HttpStub::start(vec![(502, "upstream down".to_string())]).await;
    let transport = WebhookTransport::new(Duration::from_secs(5)).unwrap();

    let result = transport.execute(&webhook_server(&stub.url), &Operation::SyncSource).await;
    match result {
        Err(DeployError::TransportError { message, output }) => {
            assert!(message.contains("502"));
            assert_eq!(output, "upstream down");
        }
        other => panic!("expected a transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_webhook_without_url_makes_no_call() {
    let mut server = Server::new(1, "Shop", "https://shop.test");
    server.webhook_url = Some("  ".to_string());
    let transport = WebhookTransport::new(Duration::from_secs(5)).unwrap();

    let result = transport.execute(&server, &Operation::SyncSource).await;
    assert!(matches!(result, Err(DeployError::ConfigError(_))));
}

#[tokio::test]
async fn test_beacon_script_and_artisan() {
    let stub = HttpStub::start(vec![
        (200, r#"{"status":"ok"}"#.to_string()),
        (
            200,
            json!({"errCode": "1", "output": BASE64.encode("Migration failed")}).to_string(),
        ),
    ])
    .await;
    let server = beacon_server(&stub.url);
    let transport = BeaconTransport::new(Duration::from_secs(5)).unwrap();

    let script = transport
        .execute(
            &server,
            &Operation::RunScript {
                name: "clear-cache".to_string(),
                vars: Map::new(),
            },
        )
        .await
        .unwrap();
    assert!(script.succeeded());

    let artisan = transport
        .execute(
            &server,
            &Operation::RunCommand {
                command: "migrate-database".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(!artisan.succeeded());
    assert_eq!(artisan.exit_code, Some(1));
    assert_eq!(artisan.output, "Migration failed");

    let requests = stub.requests();
    assert_eq!(requests[0].path, "/beacon");
    assert_eq!(requests[0].headers.get("x-beacon-key").map(String::as_str), Some("beacon-key"));
    assert_eq!(
        requests[0].json(),
        json!({"cmd": "transmitScript", "script": "clear_cache", "vars": {}})
    );
    assert_eq!(
        requests[1].json(),
        json!({"cmd": "transmitArtisan", "artisan": "october:migrate"})
    );
}

#[tokio::test]
async fn test_beacon_script_failure_is_reported() {
    let stub = HttpStub::start(vec![(200, r#"{"status":"error","error":"cache locked"}"#.to_string())]).await;
    let transport = BeaconTransport::new(Duration::from_secs(5)).unwrap();

    let output = transport
        .execute(
            &beacon_server(&stub.url),
            &Operation::RunScript {
                name: "clear-cache".to_string(),
                vars: Map::new(),
            },
        )
        .await
        .unwrap();
    assert!(!output.succeeded());
    assert_eq!(output.failure_reason(), "cache locked");
}

#[tokio::test]
async fn test_beacon_upload_then_extract() {
    let stub = HttpStub::start(vec![
        (200, json!({"path": BASE64.encode("/var/tmp/bundle.zip")}).to_string()),
        (200, r#"{"status":"ok"}"#.to_string()),
    ])
    .await;
    let server = beacon_server(&stub.url);
    let transport = BeaconTransport::new(Duration::from_secs(5)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("bundle.zip");
    std::fs::write(&local, b"zip-bytes").unwrap();

    let uploaded = transport.upload_file(&server, &local).await.unwrap();
    assert_eq!(uploaded.remote_path.as_deref(), Some("/var/tmp/bundle.zip"));

    let mut files = FileMap::new();
    files.insert(local.clone(), "/var/tmp/bundle.zip".to_string());
    let extracted = transport
        .execute(&server, &Operation::ExtractFiles { files })
        .await
        .unwrap();
    assert!(extracted.succeeded());

    let requests = stub.requests();
    assert_eq!(
        requests[0].json(),
        json!({"cmd": "transmitFile", "filename": "bundle.zip", "contents": BASE64.encode("zip-bytes")})
    );
    assert_eq!(
        requests[1].json(),
        json!({
            "cmd": "transmitScript",
            "script": "extract_archive",
            "vars": {"files": {"/var/tmp/bundle.zip": "bundle.zip"}}
        })
    );
}
