//! Orchestrator tests

use std::sync::Arc;

use deploy_commander::deploy::{DeployOptions, DeployOutcome, Orchestrator, ServerRun, ServerSelector};
use deploy_commander::errors::DeployError;
use deploy_commander::models::{DeployMethod, DeployStatus, Server, ServerStatus, TriggerSource};
use deploy_commander::storage::{MemoryStore, Store};

use crate::common::{server, FakeArchiver, MockProvider, MockTransport, Reply, ScriptedPrompt};

struct Fleet {
    store: MemoryStore,
    provider: Arc<MockProvider>,
    prompt: Arc<ScriptedPrompt>,
    staging: tempfile::TempDir,
}

impl Fleet {
    fn new(servers: Vec<Server>, provider: MockProvider, prompt: ScriptedPrompt) -> Self {
        Self {
            store: MemoryStore::with_servers(servers),
            provider: Arc::new(provider),
            prompt: Arc::new(prompt),
            staging: tempfile::tempdir().unwrap(),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::new(self.store.clone()),
            self.provider.clone(),
            Arc::new(FakeArchiver::default()),
            self.prompt.clone(),
            self.staging.path(),
        )
    }
}

fn three_servers() -> Vec<Server> {
    vec![server(1, "Alpha"), server(2, "Beta"), server(3, "Gamma")]
}

fn all_mocks() -> MockProvider {
    MockProvider::default()
        .with(1, MockTransport::new())
        .with(2, MockTransport::new())
        .with(3, MockTransport::new())
}

fn runs(outcome: DeployOutcome) -> Vec<ServerRun> {
    match outcome {
        DeployOutcome::Completed(runs) => runs,
        DeployOutcome::DryRun(_) => panic!("expected a completed deployment"),
    }
}

#[tokio::test]
async fn test_one_failure_does_not_stop_the_batch() {
    let provider = MockProvider::default()
        .with(1, MockTransport::new())
        .with(2, MockTransport::new().replying("command", Reply::Error("SQLSTATE[HY000]".into())))
        .with(3, MockTransport::new());
    let fleet = Fleet::new(three_servers(), provider, ScriptedPrompt::default());

    let options = DeployOptions {
        triggered_by: TriggerSource::Backend,
        ..Default::default()
    };
    let outcome = fleet.orchestrator().deploy(&ServerSelector::All, &options).await.unwrap();
    assert!(!outcome.succeeded());

    let runs = runs(outcome);
    let results: Vec<(u64, bool)> = runs.iter().map(|r| (r.server.id, r.ok)).collect();
    assert_eq!(results, vec![(1, true), (2, false), (3, true)]);

    // every attempt has exactly one terminal log
    let logs = fleet.store.list_logs(None, 10).await.unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|l| l.status.is_terminal()));
    assert!(logs.iter().all(|l| l.triggered_by == TriggerSource::Backend));

    let failed = fleet.store.list_logs(Some(2), 1).await.unwrap().remove(0);
    assert_eq!(failed.status, DeployStatus::Failed);
    assert!(failed.output.contains("SQLSTATE[HY000]"));
    assert!(failed.output.contains("\n\nERROR: "));

    assert!(fleet.store.server(2).await.unwrap().last_deploy_at.is_none());
    assert!(fleet.store.server(3).await.unwrap().last_deploy_at.is_some());

    // --all never asks
    assert!(fleet.prompt.asked().is_empty());
}

#[tokio::test]
async fn test_dry_run_has_no_side_effects() {
    let mut servers = three_servers();
    servers[0].deploy_method = DeployMethod::Ssh;
    let fleet = Fleet::new(servers, all_mocks(), ScriptedPrompt::default());
    let options = DeployOptions {
        dry_run: true,
        plugin_codes: vec!["Acme.Blog".to_string()],
        ..Default::default()
    };

    let outcome = fleet
        .orchestrator()
        .deploy(&ServerSelector::Name("a".to_string()), &options)
        .await
        .unwrap();

    match outcome {
        DeployOutcome::DryRun(planned) => {
            assert_eq!(planned.len(), 3);
            assert_eq!(planned[0].steps[0].kind(), "sync-source");
            assert_eq!(planned[0].steps[1].kind(), "build-archive");
            assert_eq!(planned[1].steps[1].kind(), "run-remote-script");
        }
        DeployOutcome::Completed(_) => panic!("dry run deployed"),
    }

    assert_eq!(fleet.store.log_count().await, 0);
    for id in 1..=3 {
        assert!(fleet.provider.calls(id).is_empty());
    }
    assert!(fleet.prompt.asked().is_empty());
}

#[tokio::test]
async fn test_no_match_creates_no_log() {
    let fleet = Fleet::new(three_servers(), all_mocks(), ScriptedPrompt::default());
    let result = fleet
        .orchestrator()
        .deploy(
            &ServerSelector::Url("https://unknown.test".to_string()),
            &DeployOptions::default(),
        )
        .await;

    assert!(matches!(result, Err(DeployError::NoMatchingServer)));
    assert_eq!(fleet.store.log_count().await, 0);
}

#[tokio::test]
async fn test_declined_server_is_skipped_without_log() {
    let fleet = Fleet::new(three_servers(), all_mocks(), ScriptedPrompt::confirming(&[false, true, true]));
    let outcome = fleet
        .orchestrator()
        .deploy(&ServerSelector::Name("a".to_string()), &DeployOptions::default())
        .await
        .unwrap();

    assert!(outcome.succeeded());
    let runs = runs(outcome);
    assert!(runs[0].skipped && runs[0].log.is_none());
    assert!(runs[1].ok && runs[2].ok);

    assert_eq!(
        fleet.prompt.asked(),
        vec!["confirm Alpha", "confirm Beta", "confirm Gamma"]
    );
    assert!(fleet.provider.calls(1).is_empty());
    assert_eq!(fleet.store.log_count().await, 2);
}

#[tokio::test]
async fn test_force_skips_confirmation() {
    let fleet = Fleet::new(three_servers(), all_mocks(), ScriptedPrompt::default());
    let options = DeployOptions {
        force: true,
        ..Default::default()
    };

    let outcome = fleet
        .orchestrator()
        .deploy(&ServerSelector::Url("https://beta.test/".to_string()), &options)
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert!(fleet.prompt.asked().is_empty());
    assert_eq!(
        fleet.provider.calls(2),
        vec!["sync", "script:clear-cache", "command:migrate-database"]
    );
}

#[tokio::test]
async fn test_interactive_pick_deploys_chosen_server() {
    let mut retired = server(4, "Retired");
    retired.status = ServerStatus::Legacy;
    let mut servers = three_servers();
    servers.push(retired);

    let prompt = ScriptedPrompt {
        answers: std::sync::Mutex::new([true].into_iter().collect()),
        ..ScriptedPrompt::picking(2)
    };
    let fleet = Fleet::new(servers, all_mocks(), prompt);

    let outcome = fleet
        .orchestrator()
        .deploy(&ServerSelector::Interactive, &DeployOptions::default())
        .await
        .unwrap();

    let runs = runs(outcome);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].server.name, "Gamma");
    assert_eq!(fleet.prompt.asked(), vec!["pick from 3", "confirm Gamma"]);
}

#[tokio::test]
async fn test_config_error_is_logged_before_any_call() {
    let mut broken = server(1, "Alpha");
    broken.deploy_method = DeployMethod::Ssh;
    let fleet = Fleet::new(vec![broken], all_mocks(), ScriptedPrompt::default());

    let outcome = fleet
        .orchestrator()
        .deploy(&ServerSelector::Id(1), &DeployOptions { force: true, ..Default::default() })
        .await
        .unwrap();

    assert!(!outcome.succeeded());
    let log = fleet.store.list_logs(Some(1), 1).await.unwrap().remove(0);
    assert_eq!(log.status, DeployStatus::Failed);
    assert!(log.output.starts_with("\n\nERROR: Configuration error"));
    assert!(fleet.provider.calls(1).is_empty());
}

#[tokio::test]
async fn test_beacon_servers_skip_source_sync() {
    let mut beacon = server(1, "Alpha");
    beacon.deploy_method = DeployMethod::Beacon;
    beacon.beacon_url = Some("https://alpha.test/beacon".to_string());
    let fleet = Fleet::new(vec![beacon], all_mocks(), ScriptedPrompt::default());

    let outcome = fleet
        .orchestrator()
        .deploy(&ServerSelector::Id(1), &DeployOptions { force: true, ..Default::default() })
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(
        fleet.provider.calls(1),
        vec!["script:clear-cache", "command:migrate-database"]
    );
}

#[tokio::test]
async fn test_webhook_server_ignores_plugin_bundle() {
    let fleet = Fleet::new(vec![server(1, "Alpha")], all_mocks(), ScriptedPrompt::default());
    let options = DeployOptions {
        force: true,
        plugin_codes: vec!["Acme.Blog".to_string()],
        ..Default::default()
    };

    let outcome = fleet.orchestrator().deploy(&ServerSelector::Id(1), &options).await.unwrap();

    assert!(outcome.succeeded());
    assert_eq!(
        fleet.provider.calls(1),
        vec!["sync", "script:clear-cache", "command:migrate-database"]
    );
    let log = fleet.store.list_logs(Some(1), 1).await.unwrap().remove(0);
    assert_eq!(log.status, DeployStatus::Success);
    assert!(fleet.store.server(1).await.unwrap().last_deploy_at.is_some());
}

#[tokio::test]
async fn test_prompt_error_fails_that_server_and_keeps_earlier_runs() {
    let prompt = ScriptedPrompt {
        broken_for: Some("Beta".to_string()),
        ..ScriptedPrompt::confirming(&[true, true])
    };
    let fleet = Fleet::new(three_servers(), all_mocks(), prompt);

    let outcome = fleet
        .orchestrator()
        .deploy(&ServerSelector::Name("a".to_string()), &DeployOptions::default())
        .await
        .unwrap();
    assert!(!outcome.succeeded());

    let runs = runs(outcome);
    assert_eq!(runs.len(), 3);
    assert!(runs[0].ok);
    assert!(!runs[1].ok && !runs[1].skipped && runs[1].log.is_none());
    assert!(runs[1].error.as_deref().unwrap().contains("not a terminal"));
    assert!(runs[2].ok);

    assert!(fleet.provider.calls(2).is_empty());
    assert_eq!(fleet.store.log_count().await, 2);
}
