// ABOUTME: Failure-path tests for session rollback and partial teardown
// ABOUTME: Verifies created resources are removed and leftovers are named precisely

use sndbx_sandbox::engine::fake::{EngineOp, FakeEngine};
use sndbx_sandbox::{
    DetachedTerminal, PluginAttachError, PrimaryContainerError, Sandbox, SandboxConfig,
    SandboxError, Settings, SilentReporter, TeardownStep, TerminalError,
};
use std::sync::Arc;
use tempfile::TempDir;

fn sandbox(engine: &Arc<FakeEngine>) -> Sandbox {
    Sandbox::new(
        engine.clone(),
        Settings::default(),
        Arc::new(SilentReporter),
        Arc::new(DetachedTerminal),
    )
}

fn recipe_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Dockerfile"), "FROM alpine:latest\n").unwrap();
    dir
}

fn plugin_config(dir: &TempDir, plugins: &[&str]) -> SandboxConfig {
    SandboxConfig::local_recipe("Dockerfile", dir.path())
        .with_working_directory("myapp")
        .with_plugins(plugins.iter().map(|p| p.to_string()).collect())
}

#[tokio::test]
async fn test_primary_create_failure_rolls_back_plugins_network_and_image() {
    let dir = recipe_dir();
    let engine = Arc::new(
        FakeEngine::new()
            .with_image("postgres:latest")
            .fail_on(EngineOp::CreateContainer, "sndbx-myapp", 1),
    );

    let err = sandbox(&engine)
        .run(&plugin_config(&dir, &["postgres:latest"]), tokio::io::empty(), tokio::io::sink())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SandboxError::Primary(PrimaryContainerError::CreateFailed { .. })
    ));
    assert!(engine.containers().is_empty());
    assert!(engine.networks().is_empty());
    assert!(!engine.has_image("sndbx-myapp"));
    assert!(engine.has_image("postgres:latest"));
}

#[tokio::test]
async fn test_plugin_failure_rolls_back_earlier_plugins() {
    let dir = recipe_dir();
    let engine = Arc::new(
        FakeEngine::new()
            .with_image("postgres:latest")
            .fail_on(EngineOp::PullImage, "redis:7", 1),
    );

    let err = sandbox(&engine)
        .run(
            &plugin_config(&dir, &["postgres:latest", "redis:7"]),
            tokio::io::empty(),
            tokio::io::sink(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SandboxError::Plugin(PluginAttachError::PullFailed { .. })
    ));
    assert!(engine.containers().is_empty());
    assert!(engine.networks().is_empty());
}

#[tokio::test]
async fn test_network_failure_rolls_back_built_image() {
    let dir = recipe_dir();
    let engine = Arc::new(FakeEngine::new().with_empty_network_id());

    let err = sandbox(&engine)
        .run(&plugin_config(&dir, &["postgres:latest"]), tokio::io::empty(), tokio::io::sink())
        .await
        .unwrap_err();

    assert!(matches!(err, SandboxError::Network(_)));
    assert_eq!(engine.count(EngineOp::CreateContainer), 0);
    assert!(!engine.has_image("sndbx-myapp"));
}

#[tokio::test]
async fn test_terminal_failure_rolls_back_running_session() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        FakeEngine::new()
            .with_image("alpine:latest")
            .fail(EngineOp::CreateExec, 1),
    );
    let config = SandboxConfig::remote_image("alpine:latest", dir.path());

    let err = sandbox(&engine)
        .run(&config, tokio::io::empty(), tokio::io::sink())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SandboxError::Terminal(TerminalError::ExecCreate { .. })
    ));
    assert!(engine.containers().is_empty());
    // Reused images are not the session's to remove on failure
    assert!(engine.has_image("alpine:latest"));
    assert_eq!(engine.count(EngineOp::RemoveImage), 0);
}

#[tokio::test]
async fn test_incomplete_rollback_names_leftovers() {
    let dir = recipe_dir();
    let engine = Arc::new(
        FakeEngine::new()
            .with_image("postgres:latest")
            .fail_on(EngineOp::StartContainer, "container-5", 1)
            .fail(EngineOp::RemoveNetwork, 1),
    );

    let err = sandbox(&engine)
        .run(&plugin_config(&dir, &["postgres:latest"]), tokio::io::empty(), tokio::io::sink())
        .await
        .unwrap_err();

    match err {
        SandboxError::RolledBack { cause, leftover } => {
            assert!(matches!(
                *cause,
                SandboxError::Primary(PrimaryContainerError::StartFailed { .. })
            ));
            let steps: Vec<TeardownStep> = leftover.failures().iter().map(|f| f.step).collect();
            assert_eq!(steps, vec![TeardownStep::Network]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.containers().is_empty());
    assert_eq!(engine.networks().len(), 1);
}

#[tokio::test]
async fn test_partial_teardown_removes_everything_else() {
    let dir = recipe_dir();
    let engine = Arc::new(
        FakeEngine::new()
            .with_image("postgres:latest")
            .fail(EngineOp::RemoveImage, 1),
    );
    let config = plugin_config(&dir, &["postgres:latest"]).with_remove_after_use(true);

    let err = sandbox(&engine)
        .run(&config, tokio::io::empty(), tokio::io::sink())
        .await
        .unwrap_err();

    match err {
        SandboxError::Teardown(teardown) => {
            assert_eq!(teardown.failures().len(), 1);
            assert_eq!(teardown.failures()[0].step, TeardownStep::Image);
            assert_eq!(teardown.failures()[0].resource, "sndbx-myapp");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.containers().is_empty());
    assert!(engine.networks().is_empty());
    assert!(engine.has_image("sndbx-myapp"));
}
