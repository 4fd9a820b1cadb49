//! Integration tests for the coordinator.
//!
//! Drives branch kills and workflow cancellation end to end against a mock
//! workflow engine, including configuration loading.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use branch_killswitch::infrastructure::config::{CancellerBackend, KillSwitchSettings, Settings};
use branch_killswitch::kill_switch::KillError;
use branch_killswitch::workflow::CancellationMode;
use branch_killswitch::Coordinator;
use common::{branch, coordinator, register_tree, EngineCall, MockEngine, WorktreeHook};

#[tokio::test(start_paused = true)]
async fn kill_should_cancel_workflow_and_remove_worktree() -> anyhow::Result<()> {
    let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(10)));
    let coordinator = coordinator(&engine, KillSwitchSettings::default());
    let hook = Arc::new(WorktreeHook::default());
    coordinator.add_teardown_hook(hook.clone());
    coordinator.register_branch(branch("b1"), Some("wf-b1".to_string()));

    coordinator
        .kill_branch(&branch("b1"), "tests failed", Duration::from_secs(1))
        .await?;

    assert_eq!(engine.calls(), vec![EngineCall::Cancel("wf-b1".to_string())]);
    assert_eq!(hook.removed(), vec!["b1"]);
    let status = coordinator
        .cancellation_status("wf-b1")
        .expect("status cached");
    assert!(status.success);
    assert_eq!(status.resources_freed, vec!["wf-b1-cell"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn force_mode_kill_should_terminate_workflow() -> anyhow::Result<()> {
    let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(10)));
    let settings = KillSwitchSettings {
        default_mode: CancellationMode::Force,
        ..KillSwitchSettings::default()
    };
    let coordinator = coordinator(&engine, settings);
    coordinator.register_branch(branch("b1"), Some("wf-b1".to_string()));

    coordinator
        .kill_branch(&branch("b1"), "shutdown", Duration::from_secs(1))
        .await?;

    assert_eq!(
        engine.calls(),
        vec![EngineCall::Terminate("wf-b1".to_string())]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_workflow_cancel_should_degrade_kill() {
    let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(10)));
    engine.delay("wf-n2", Duration::from_secs(10));
    let coordinator = coordinator(&engine, KillSwitchSettings::default());
    register_tree(&coordinator, &[("n1", "n2"), ("n2", "n3"), ("n3", "n4")]);

    let result = coordinator
        .kill_dependent_branches(&branch("n1"), Duration::from_millis(200))
        .await;

    assert_eq!(
        result,
        Err(KillError::Timeout {
            branch_id: branch("n2"),
            timeout: Duration::from_millis(200),
        })
    );
    assert!(coordinator.branches().iter().all(|b| b.is_killed()));
    let stats = coordinator.stats();
    assert_eq!(stats.total_kills, 4);
    assert_eq!(stats.degraded_kills, 1);
    // The kill gave up before the canceller's own timeout.
    assert!(!coordinator.has_pending_cancellation("wf-n2"));
    let abandoned = coordinator.cancellation_status("wf-n2").expect("cached");
    assert!(!abandoned.success);
    assert!(abandoned.completed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn unknown_workflow_should_not_block_kill() -> anyhow::Result<()> {
    let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(10)));
    engine.forget("wf-b1");
    let coordinator = coordinator(&engine, KillSwitchSettings::default());
    coordinator.register_branch(branch("b1"), Some("wf-b1".to_string()));

    coordinator
        .kill_branch(&branch("b1"), "orphaned", Duration::from_secs(1))
        .await?;

    assert!(coordinator.branch(&branch("b1")).expect("registered").is_killed());
    let status = coordinator.cancellation_status("wf-b1").expect("cached");
    assert!(!status.success);
    assert!(status.error.expect("error set").contains("not found"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn batch_through_facade_should_cover_every_identifier() {
    let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(50)));
    let coordinator = coordinator(&engine, KillSwitchSettings::default());
    let ids: Vec<String> = (0..50).map(|i| format!("wf-{i}")).collect();

    let results: HashMap<_, _> = coordinator
        .cancel_workflows(&ids, CancellationMode::Graceful)
        .await
        .expect("canceller configured");

    assert_eq!(results.len(), 50);
    assert!(results.values().all(|s| s.success));
    assert_eq!(engine.peak(), 10);

    coordinator.clear_cancellations();
    assert!(coordinator.cancellation_status("wf-0").is_none());
}

#[tokio::test(start_paused = true)]
async fn force_cancel_past_timeout_should_report_failure() -> anyhow::Result<()> {
    let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(300)));
    let coordinator = coordinator(&engine, KillSwitchSettings::default());

    let status = coordinator
        .cancel_workflow_force("wf-x")
        .await?
        .expect("canceller configured");

    assert!(!status.success);
    assert!(status.error.expect("error set").contains("timed out"));
    assert!(status.duration >= Duration::from_millis(250));
    assert!(status.duration < Duration::from_millis(300));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_should_share_one_kill() -> anyhow::Result<()> {
    let engine = Arc::new(MockEngine::with_delay(Duration::from_millis(40)));
    let coordinator = Arc::new(coordinator(&engine, KillSwitchSettings::default()));
    coordinator.register_branch(branch("b1"), Some("wf-b1".to_string()));

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .kill_branch(&branch("b1"), &format!("caller {i}"), Duration::from_secs(1))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await??;
    }

    assert_eq!(engine.calls().len(), 1);
    assert_eq!(coordinator.stats().total_kills, 1);
    Ok(())
}

#[test]
fn coordinator_should_follow_environment_configuration() -> anyhow::Result<()> {
    let vars: HashMap<String, String> = [
        ("KILLSWITCH__CANCELLATION__BACKEND", "noop"),
        ("KILLSWITCH__KILL_SWITCH__BRANCH_KILL_TIMEOUT_MS", "750"),
        ("KILLSWITCH__KILL_SWITCH__CASCADE_TIMEOUT_MULTIPLIER", "4"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let environment = config::Environment::with_prefix("KILLSWITCH")
        .separator("__")
        .try_parsing(true)
        .source(Some(vars));

    let settings = Settings::from_environment(environment)?;
    let coordinator = Coordinator::from_settings(&settings);

    assert_eq!(settings.cancellation.backend, CancellerBackend::Noop);
    assert!(coordinator.canceller().is_some());
    assert_eq!(coordinator.branch_kill_timeout(), Duration::from_millis(750));
    assert_eq!(
        coordinator
            .kill_switch()
            .cascade_timeout(coordinator.branch_kill_timeout()),
        Duration::from_millis(3000)
    );
    Ok(())
}
