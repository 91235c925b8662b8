//! JSON store tests

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};

use deploy_commander::filesys::file::File;
use deploy_commander::models::{DeployMethod, DeployStatus, Server, SshAuthMethod, TriggerSource};
use deploy_commander::storage::layout::StorageLayout;
use deploy_commander::storage::{JsonStore, Store};

async fn seeded_layout(servers: &[Server]) -> (tempfile::TempDir, StorageLayout) {
    let home = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(home.path());
    layout.servers_file().write_json(&servers).await.unwrap();
    (home, layout)
}

#[tokio::test]
async fn test_state_survives_reopening() {
    let (_home, layout) = seeded_layout(&[Server::new(1, "Shop", "https://shop.test")]).await;

    let store = JsonStore::new(&layout);
    let log = store.create_log(1, TriggerSource::Webhook).await.unwrap();
    store
        .finalize_log(log.id, DeployStatus::Success, "done".to_string())
        .await
        .unwrap();
    store.touch_server(1, Utc::now(), "1.0.0").await.unwrap();

    let reopened = JsonStore::new(&layout);
    let logs = reopened.list_logs(Some(1), 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, DeployStatus::Success);
    assert_eq!(logs[0].triggered_by, TriggerSource::Webhook);
    assert_eq!(logs[0].output, "done");

    let servers = reopened.list_servers().await.unwrap();
    assert_eq!(servers[0].last_version.as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn test_credentials_round_trip_through_disk() {
    let mut server = Server::new(1, "Shop", "https://shop.test");
    server.deploy_method = DeployMethod::Ssh;
    server.ssh_auth_method = SshAuthMethod::Password;
    server.ssh_password = Some(SecretString::from("s3cret".to_string()));
    let (_home, layout) = seeded_layout(&[server]).await;

    let store = JsonStore::new(&layout);
    store.touch_server(1, Utc::now(), "1.0.1").await.unwrap();

    let servers = store.list_servers().await.unwrap();
    let password = servers[0].ssh_password.as_ref().unwrap();
    assert_eq!(password.expose_secret(), "s3cret");
    assert!(!format!("{:?}", servers[0]).contains("s3cret"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(layout.servers_file().path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[tokio::test]
async fn test_removing_a_server_orphans_its_logs() {
    let (_home, layout) = seeded_layout(&[
        Server::new(1, "Shop", "https://shop.test"),
        Server::new(2, "Blog", "https://blog.test"),
    ])
    .await;

    let store = JsonStore::new(&layout);
    store.create_log(1, TriggerSource::Cli).await.unwrap();
    store.create_log(2, TriggerSource::Cli).await.unwrap();

    assert!(store.remove_server(1).await.unwrap());
    assert!(!store.remove_server(1).await.unwrap());

    let logs = store.list_logs(None, 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].server_id, Some(2));
    assert_eq!(logs[1].server_id, None);
    assert_eq!(store.list_servers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_corrupt_file_is_storage_error() {
    let home = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(home.path());
    File::new(layout.servers_file().path())
        .write_atomic(b"{ not json")
        .await
        .unwrap();

    let result = JsonStore::new(&layout).list_servers().await;
    tokio_test::assert_err!(result);
}
