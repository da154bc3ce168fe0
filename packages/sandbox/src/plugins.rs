// ABOUTME: Sidecar plugin containers attached to the session network
// ABOUTME: Creates and starts plugins in order, pulling once when an image is missing

use crate::config::Settings;
use crate::engine::{ContainerEngine, ContainerSpec};
use crate::error::PluginAttachError;
use crate::report::{Reporter, SessionEvent};
use crate::resolver::pull_image;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A sidecar container created for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    /// Image reference the plugin runs
    pub reference: String,
    /// Container name, also its hostname on the session network
    pub name: String,
    pub container_id: String,
}

pub struct PluginAttacher {
    engine: Arc<dyn ContainerEngine>,
    settings: Settings,
    reporter: Arc<dyn Reporter>,
    labels: HashMap<String, String>,
}

impl PluginAttacher {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        settings: Settings,
        reporter: Arc<dyn Reporter>,
        labels: HashMap<String, String>,
    ) -> Self {
        Self {
            engine,
            settings,
            reporter,
            labels,
        }
    }

    /// Create and start one container per reference, in the given order
    ///
    /// A failed create triggers exactly one pull followed by one more create.
    /// On error, the plugins created so far travel inside the error.
    pub async fn attach_plugins(
        &self,
        references: &[String],
        network_id: &str,
    ) -> Result<Vec<Plugin>, PluginAttachError> {
        let mut attached = Vec::with_capacity(references.len());

        for reference in references {
            let name = self.settings.plugin_name(reference);
            let spec = ContainerSpec {
                name: name.clone(),
                image: reference.clone(),
                network: Some(network_id.to_string()),
                labels: self.labels.clone(),
                ..Default::default()
            };

            let container_id = match self.engine.create_container(&spec).await {
                Ok(id) => id,
                Err(first) => {
                    debug!(
                        "Creating plugin {} failed ({}), pulling {}",
                        name, first, reference
                    );
                    if let Err(source) =
                        pull_image(self.engine.as_ref(), self.reporter.as_ref(), reference).await
                    {
                        error!("Failed to pull plugin image {}: {}", reference, source);
                        return Err(PluginAttachError::PullFailed {
                            reference: reference.clone(),
                            source,
                            created: attached,
                        });
                    }

                    match self.engine.create_container(&spec).await {
                        Ok(id) => id,
                        Err(source) => {
                            error!("Failed to create plugin {}: {}", name, source);
                            return Err(PluginAttachError::CreateFailed {
                                reference: reference.clone(),
                                source,
                                created: attached,
                            });
                        }
                    }
                }
            };

            info!("Created plugin container {} ({})", name, container_id);
            self.reporter.report(SessionEvent::PluginCreated {
                reference: reference.clone(),
                container_id: container_id.clone(),
            });

            attached.push(Plugin {
                reference: reference.clone(),
                name: name.clone(),
                container_id: container_id.clone(),
            });

            if let Err(source) = self.engine.start_container(&container_id).await {
                error!("Failed to start plugin {}: {}", name, source);
                return Err(PluginAttachError::StartFailed {
                    reference: reference.clone(),
                    container_id,
                    source,
                    created: attached,
                });
            }

            self.reporter.report(SessionEvent::PluginStarted {
                reference: reference.clone(),
                container_id,
            });
            self.reporter.report(SessionEvent::PluginReachable {
                reference: reference.clone(),
                name,
                network: network_id.to_string(),
            });
        }

        Ok(attached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{EngineOp, FakeEngine};
    use crate::report::SilentReporter;
    use pretty_assertions::assert_eq;

    fn attacher(engine: &Arc<FakeEngine>) -> PluginAttacher {
        let settings = Settings::default();
        let labels = settings.session_labels("sndbx-myapp");
        PluginAttacher::new(engine.clone(), settings, Arc::new(SilentReporter), labels)
    }

    fn refs(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_no_plugins_is_a_no_op() {
        let engine = Arc::new(FakeEngine::new());

        let attached = attacher(&engine).attach_plugins(&[], "network-1").await.unwrap();

        assert!(attached.is_empty());
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_is_pulled_then_created() {
        let engine = Arc::new(FakeEngine::new());

        let attached = attacher(&engine)
            .attach_plugins(&refs(&["postgres:latest"]), "network-1")
            .await
            .unwrap();

        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].name, "sndbx-postgres");
        assert_eq!(
            engine.ops(),
            vec![
                EngineOp::CreateContainer,
                EngineOp::PullImage,
                EngineOp::CreateContainer,
                EngineOp::StartContainer,
            ]
        );
        assert!(engine.is_running(&attached[0].container_id));
        let spec = engine.container_spec(&attached[0].container_id).unwrap();
        assert_eq!(spec.network.as_deref(), Some("network-1"));
    }

    #[tokio::test]
    async fn test_second_create_failure_is_fatal_without_third_attempt() {
        let engine = Arc::new(FakeEngine::new().fail(EngineOp::CreateContainer, 2));

        let err = attacher(&engine)
            .attach_plugins(&refs(&["postgres:latest", "redis:7"]), "network-1")
            .await
            .unwrap_err();

        assert!(matches!(err, PluginAttachError::CreateFailed { .. }));
        assert_eq!(engine.count(EngineOp::CreateContainer), 2);
        assert_eq!(engine.count(EngineOp::PullImage), 1);
        assert!(err.created().is_empty());
    }

    #[tokio::test]
    async fn test_failure_carries_already_created_plugins() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_image("postgres:latest")
                .fail_on(EngineOp::PullImage, "redis:7", 1),
        );

        let err = attacher(&engine)
            .attach_plugins(&refs(&["postgres:latest", "redis:7"]), "network-1")
            .await
            .unwrap_err();

        assert!(matches!(err, PluginAttachError::PullFailed { .. }));
        assert_eq!(err.created().len(), 1);
        assert_eq!(err.created()[0].reference, "postgres:latest");
    }

    #[tokio::test]
    async fn test_start_failure_includes_unstarted_container() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_image("postgres:latest")
                .fail(EngineOp::StartContainer, 1),
        );

        let err = attacher(&engine)
            .attach_plugins(&refs(&["postgres:latest"]), "network-1")
            .await
            .unwrap_err();

        assert!(matches!(err, PluginAttachError::StartFailed { .. }));
        assert_eq!(err.created().len(), 1);
        assert_eq!(engine.containers(), vec![err.created()[0].container_id.clone()]);
    }
}
