// ABOUTME: End-to-end session tests against the recording engine
// ABOUTME: Covers remote-image and local-recipe sessions from resolve through teardown

use pretty_assertions::assert_eq;
use sndbx_sandbox::engine::fake::{EngineCall, EngineOp, FakeEngine};
use sndbx_sandbox::report::RecordingReporter;
use sndbx_sandbox::{
    DetachedTerminal, ImageRetention, PortPair, Sandbox, SandboxConfig, SessionEvent,
    SessionOutcome, Settings, SilentReporter, TeardownStep,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, DuplexStream};

fn sandbox(engine: &Arc<FakeEngine>) -> Sandbox {
    Sandbox::new(
        engine.clone(),
        Settings::default(),
        Arc::new(SilentReporter),
        Arc::new(DetachedTerminal),
    )
}

/// Operator input that types a line and then hits Ctrl-D
async fn typed(line: &[u8]) -> DuplexStream {
    let (mut operator, stdin) = tokio::io::duplex(256);
    operator.write_all(line).await.unwrap();
    drop(operator);
    stdin
}

#[tokio::test]
async fn test_remote_image_session_without_plugins() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::new().with_image("alpine:latest"));
    let config = SandboxConfig::remote_image("alpine:latest", dir.path())
        .with_working_directory("myapp")
        .with_ports(vec![PortPair::same(8080)])
        .with_remove_after_use(true);

    let outcome = sandbox(&engine)
        .run(&config, typed(b"echo hi\n").await, tokio::io::sink())
        .await
        .unwrap();

    assert_eq!(
        engine.ops(),
        vec![
            EngineOp::ListImages,
            EngineOp::CreateContainer,
            EngineOp::StartContainer,
            EngineOp::CreateExec,
            EngineOp::AttachExec,
            EngineOp::RemoveContainer,
            EngineOp::RemoveImage,
        ]
    );

    let spec = engine
        .calls()
        .into_iter()
        .find_map(|call| match call {
            EngineCall::CreateContainer(spec) => Some(spec),
            _ => None,
        })
        .unwrap();
    assert_eq!(spec.ports, vec![PortPair::same(8080)]);
    assert_eq!(spec.network, None);

    assert_eq!(engine.stdin_received(), b"echo hi\n".to_vec());
    assert!(engine.input_closed());
    assert!(engine.containers().is_empty());
    assert!(engine.networks().is_empty());
    assert!(!engine.has_image("alpine:latest"));

    match outcome {
        SessionOutcome::Removed(report) => {
            let steps: Vec<TeardownStep> = report.removed.iter().map(|(s, _)| *s).collect();
            assert_eq!(steps, vec![TeardownStep::PrimaryContainer, TeardownStep::Image]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_recipe_session_with_plugin() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Dockerfile"), "FROM alpine:latest\n").unwrap();
    let engine = Arc::new(FakeEngine::new());
    let config = SandboxConfig::local_recipe("Dockerfile", dir.path())
        .with_working_directory("myapp")
        .with_plugins(vec!["postgres:latest".to_string()])
        .with_remove_after_use(true);

    sandbox(&engine)
        .run(&config, typed(b"exit\n").await, tokio::io::sink())
        .await
        .unwrap();

    assert_eq!(
        engine.ops(),
        vec![
            EngineOp::BuildImage,
            EngineOp::ImageOs,
            EngineOp::CreateNetwork,
            EngineOp::CreateContainer,
            EngineOp::PullImage,
            EngineOp::CreateContainer,
            EngineOp::StartContainer,
            EngineOp::CreateContainer,
            EngineOp::StartContainer,
            EngineOp::CreateExec,
            EngineOp::AttachExec,
            EngineOp::RemoveContainer,
            EngineOp::RemoveImage,
            EngineOp::RemoveContainer,
            EngineOp::RemoveNetwork,
        ]
    );

    let calls = engine.calls();
    let created: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            EngineCall::CreateContainer(spec) => Some(spec),
            _ => None,
        })
        .collect();
    match &calls[2] {
        EngineCall::CreateNetwork(spec) => assert_eq!(spec.name, "sndbx-myapp-net"),
        other => panic!("unexpected call {:?}", other),
    }
    let network_id = created[1].network.clone().unwrap();
    assert_eq!(created[1].name, "sndbx-postgres");
    assert_eq!(created[1].image, "postgres:latest");
    assert_eq!(created[2].name, "sndbx-myapp");
    assert_eq!(created[2].image, "sndbx-myapp");
    assert_eq!(created[2].network.as_deref(), Some(network_id.as_str()));

    let started: Vec<String> = calls
        .iter()
        .filter_map(|call| match call {
            EngineCall::StartContainer(id) => Some(id.clone()),
            _ => None,
        })
        .collect();
    let (plugin_id, primary_id) = (started[0].clone(), started[1].clone());

    let removals: Vec<EngineCall> = calls.into_iter().skip(11).collect();
    assert_eq!(
        removals,
        vec![
            EngineCall::RemoveContainer {
                id: primary_id,
                force: true
            },
            EngineCall::RemoveImage("sndbx-myapp".to_string()),
            EngineCall::RemoveContainer {
                id: plugin_id,
                force: true
            },
            EngineCall::RemoveNetwork(network_id),
        ]
    );

    assert!(engine.containers().is_empty());
    assert!(engine.networks().is_empty());
    assert!(!engine.has_image("sndbx-myapp"));
}

#[tokio::test]
async fn test_left_running_session_reports_handoff() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        FakeEngine::new()
            .with_image("alpine:latest")
            .with_image("redis:7"),
    );
    let reporter = Arc::new(RecordingReporter::new());
    let sandbox = Sandbox::new(
        engine.clone(),
        Settings::default(),
        reporter.clone(),
        Arc::new(DetachedTerminal),
    );
    let config = SandboxConfig::remote_image("alpine:latest", dir.path())
        .with_working_directory("myapp")
        .with_plugins(vec!["redis:7".to_string()]);

    let outcome = sandbox
        .run(&config, tokio::io::empty(), tokio::io::sink())
        .await
        .unwrap();

    let resources = match outcome {
        SessionOutcome::LeftRunning(resources) => resources,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(engine.containers().len(), 2);
    assert_eq!(engine.networks().len(), 1);

    let events = reporter.events();
    assert!(events.contains(&SessionEvent::PluginReachable {
        reference: "redis:7".to_string(),
        name: "sndbx-redis".to_string(),
        network: resources.network.clone().unwrap(),
    }));
    assert_eq!(events.last(), Some(&SessionEvent::LeftRunning(resources)));
}

#[tokio::test]
async fn test_kept_image_survives_teardown() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FakeEngine::new());
    let config = SandboxConfig::remote_image("alpine:latest", dir.path())
        .with_remove_after_use(true)
        .with_image_retention(ImageRetention::Keep);

    sandbox(&engine)
        .run(&config, tokio::io::empty(), tokio::io::sink())
        .await
        .unwrap();

    assert_eq!(engine.count(EngineOp::PullImage), 1);
    assert_eq!(engine.count(EngineOp::RemoveImage), 0);
    assert!(engine.has_image("alpine:latest"));
    assert!(engine.containers().is_empty());
}

#[tokio::test]
async fn test_present_plugin_image_is_not_pulled() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(
        FakeEngine::new()
            .with_image("alpine:latest")
            .with_image("postgres:latest"),
    );
    let config = SandboxConfig::remote_image("alpine:latest", dir.path())
        .with_plugins(vec!["postgres:latest".to_string()])
        .with_remove_after_use(true);

    sandbox(&engine)
        .run(&config, tokio::io::empty(), tokio::io::sink())
        .await
        .unwrap();

    assert_eq!(engine.count(EngineOp::PullImage), 0);
    assert!(engine.has_image("postgres:latest"));
}
