// ABOUTME: Ordered removal of every resource a session created
// ABOUTME: Attempts each removal independently and aggregates what could not be removed

use crate::engine::{ContainerEngine, EngineError};
use crate::error::{TeardownError, TeardownFailure, TeardownStep};
use crate::plugins::Plugin;
use crate::report::{Reporter, SessionEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resources owned by one session, in creation order by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionResources {
    /// Primary container id
    pub primary: Option<String>,
    /// Image to remove with the session
    pub image: Option<String>,
    pub plugins: Vec<Plugin>,
    /// Session network id
    pub network: Option<String>,
}

impl SessionResources {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none()
            && self.image.is_none()
            && self.plugins.is_empty()
            && self.network.is_none()
    }
}

/// What a teardown removed, in removal order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub removed: Vec<(TeardownStep, String)>,
}

pub struct TeardownCoordinator {
    engine: Arc<dyn ContainerEngine>,
    reporter: Arc<dyn Reporter>,
}

impl TeardownCoordinator {
    pub fn new(engine: Arc<dyn ContainerEngine>, reporter: Arc<dyn Reporter>) -> Self {
        Self { engine, reporter }
    }

    /// Remove the primary container, image, plugins and network, in that order
    ///
    /// Every step is attempted even when an earlier one fails. Resources the
    /// engine no longer knows about count as removed.
    pub async fn teardown(
        &self,
        resources: &SessionResources,
    ) -> Result<TeardownReport, TeardownError> {
        let mut report = TeardownReport::default();
        let mut failures = Vec::new();

        if let Some(id) = &resources.primary {
            let result = self.engine.remove_container(id, true).await;
            self.settle(TeardownStep::PrimaryContainer, id, result, &mut report, &mut failures);
        }

        if let Some(image) = &resources.image {
            let result = self.engine.remove_image(image).await;
            self.settle(TeardownStep::Image, image, result, &mut report, &mut failures);
        }

        for plugin in &resources.plugins {
            let result = self.engine.remove_container(&plugin.container_id, true).await;
            self.settle(
                TeardownStep::Plugin,
                &plugin.container_id,
                result,
                &mut report,
                &mut failures,
            );
        }

        if let Some(id) = &resources.network {
            let result = self.engine.remove_network(id).await;
            self.settle(TeardownStep::Network, id, result, &mut report, &mut failures);
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(TeardownError::Partial { failures })
        }
    }

    fn settle(
        &self,
        step: TeardownStep,
        resource: &str,
        result: Result<(), EngineError>,
        report: &mut TeardownReport,
        failures: &mut Vec<TeardownFailure>,
    ) {
        match result {
            Ok(()) => info!("Removed {} {}", step, resource),
            Err(e) if e.is_not_found() => debug!("{} {} already gone", step, resource),
            Err(source) => {
                warn!("Failed to remove {} {}: {}", step, resource, source);
                failures.push(TeardownFailure {
                    step,
                    resource: resource.to_string(),
                    source,
                });
                return;
            }
        }

        self.reporter.report(SessionEvent::Removed {
            step,
            resource: resource.to_string(),
        });
        report.removed.push((step, resource.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{EngineCall, EngineOp, FakeEngine};
    use crate::engine::{ContainerSpec, NetworkSpec};
    use crate::report::SilentReporter;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    async fn provisioned(engine: &FakeEngine) -> SessionResources {
        let network = engine
            .create_network(&NetworkSpec {
                name: "sndbx-myapp-net".to_string(),
                driver: "bridge".to_string(),
                attachable: true,
                labels: HashMap::new(),
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for (name, image) in [("sndbx-postgres", "postgres:latest"), ("sndbx-myapp", "sndbx-myapp")] {
            let id = engine
                .create_container(&ContainerSpec {
                    name: name.to_string(),
                    image: image.to_string(),
                    network: Some(network.clone()),
                    ..Default::default()
                })
                .await
                .unwrap();
            engine.start_container(&id).await.unwrap();
            ids.push(id);
        }

        SessionResources {
            primary: Some(ids[1].clone()),
            image: Some("sndbx-myapp".to_string()),
            plugins: vec![Plugin {
                reference: "postgres:latest".to_string(),
                name: "sndbx-postgres".to_string(),
                container_id: ids[0].clone(),
            }],
            network: Some(network),
        }
    }

    fn engine() -> FakeEngine {
        FakeEngine::new()
            .with_image("postgres:latest")
            .with_image("sndbx-myapp")
    }

    #[tokio::test]
    async fn test_removal_order() {
        let engine = Arc::new(engine());
        let resources = provisioned(&engine).await;
        let before = engine.calls().len();

        let report = TeardownCoordinator::new(engine.clone(), Arc::new(SilentReporter))
            .teardown(&resources)
            .await
            .unwrap();

        let steps: Vec<TeardownStep> = report.removed.iter().map(|(step, _)| *step).collect();
        assert_eq!(
            steps,
            vec![
                TeardownStep::PrimaryContainer,
                TeardownStep::Image,
                TeardownStep::Plugin,
                TeardownStep::Network,
            ]
        );
        let removals: Vec<EngineCall> = engine.calls().split_off(before);
        assert!(removals.iter().all(|call| match call {
            EngineCall::RemoveContainer { force, .. } => *force,
            _ => true,
        }));
        assert!(engine.containers().is_empty());
        assert!(engine.networks().is_empty());
        assert!(!engine.has_image("sndbx-myapp"));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_steps() {
        let engine = Arc::new(engine().fail(EngineOp::RemoveImage, 1));
        let resources = provisioned(&engine).await;

        let err = TeardownCoordinator::new(engine.clone(), Arc::new(SilentReporter))
            .teardown(&resources)
            .await
            .unwrap_err();

        let failed: Vec<TeardownStep> = err.failures().iter().map(|f| f.step).collect();
        assert_eq!(failed, vec![TeardownStep::Image]);
        assert!(engine.containers().is_empty());
        assert!(engine.networks().is_empty());
        assert!(engine.has_image("sndbx-myapp"));
    }

    #[tokio::test]
    async fn test_plugin_failure_leaves_network_reported() {
        let engine = engine();
        let resources = provisioned(&engine).await;
        let plugin_id = resources.plugins[0].container_id.clone();
        let engine = Arc::new(engine.fail_on(EngineOp::RemoveContainer, &plugin_id, 1));

        let err = TeardownCoordinator::new(engine.clone(), Arc::new(SilentReporter))
            .teardown(&resources)
            .await
            .unwrap_err();

        let failed: Vec<TeardownStep> = err.failures().iter().map(|f| f.step).collect();
        assert_eq!(failed, vec![TeardownStep::Plugin, TeardownStep::Network]);
        assert_eq!(engine.containers(), vec![plugin_id]);
    }

    #[tokio::test]
    async fn test_already_removed_counts_as_removed() {
        let engine = Arc::new(FakeEngine::new());
        let resources = SessionResources {
            primary: Some("container-gone".to_string()),
            ..Default::default()
        };

        let report = TeardownCoordinator::new(engine.clone(), Arc::new(SilentReporter))
            .teardown(&resources)
            .await
            .unwrap();

        assert_eq!(
            report.removed,
            vec![(TeardownStep::PrimaryContainer, "container-gone".to_string())]
        );
    }
}
