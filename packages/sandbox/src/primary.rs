// ABOUTME: Primary container creation and startup
// ABOUTME: Bind-mounts the host directory, binds ports and injects env into the session container

use crate::config::{SandboxConfig, Settings};
use crate::engine::{BindMount, ContainerEngine, ContainerSpec, PortPair};
use crate::error::PrimaryContainerError;
use crate::report::{Reporter, SessionEvent};
use crate::resolver::Environment;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tracing::{debug, error, info};

/// The session's main container, started and ready for attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    pub ports: Vec<PortPair>,
}

pub struct PrimaryContainerManager {
    engine: Arc<dyn ContainerEngine>,
    settings: Settings,
    reporter: Arc<dyn Reporter>,
    labels: HashMap<String, String>,
}

impl PrimaryContainerManager {
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

    /// Describe the primary container without creating it
    pub fn container_spec(
        &self,
        environment: &Environment,
        config: &SandboxConfig,
        network_id: Option<&str>,
    ) -> Result<ContainerSpec, PrimaryContainerError> {
        let host_path = fs::canonicalize(&config.host_directory)
            .map_err(PrimaryContainerError::HostDirectory)?;

        Ok(ContainerSpec {
            name: self.settings.resource_name(&config.working_directory),
            image: environment.image.clone(),
            tty: true,
            open_stdin: true,
            working_dir: Some(self.settings.container_workdir.clone()),
            command: Some(vec![self.settings.shell.clone()]),
            mounts: vec![BindMount {
                host_path: host_path.to_string_lossy().into_owned(),
                container_path: self.settings.container_workdir.clone(),
                readonly: false,
            }],
            ports: config.ports.clone(),
            env: config.env.clone(),
            network: network_id.map(str::to_string),
            labels: self.labels.clone(),
        })
    }

    /// Create and start the primary container
    ///
    /// A start failure carries the id of the created container so the caller
    /// can remove it.
    pub async fn start_primary(
        &self,
        environment: &Environment,
        config: &SandboxConfig,
        network_id: Option<&str>,
    ) -> Result<PrimaryContainer, PrimaryContainerError> {
        let spec = self.container_spec(environment, config, network_id)?;
        debug!(
            "Creating container {} from {} with {} port binding(s)",
            spec.name,
            spec.image,
            spec.ports.len()
        );

        let id = self.engine.create_container(&spec).await.map_err(|source| {
            error!("Failed to create container {}: {}", spec.name, source);
            PrimaryContainerError::CreateFailed {
                name: spec.name.clone(),
                source,
            }
        })?;

        info!("Created container {} ({})", spec.name, id);
        self.reporter
            .report(SessionEvent::ContainerCreated { id: id.clone() });

        if let Err(source) = self.engine.start_container(&id).await {
            error!("Failed to start container {}: {}", id, source);
            return Err(PrimaryContainerError::StartFailed {
                container_id: id,
                source,
            });
        }

        info!("Started container {}", id);
        self.reporter
            .report(SessionEvent::ContainerStarted { id: id.clone() });

        Ok(PrimaryContainer {
            id,
            name: spec.name,
            image: spec.image,
            network: spec.network,
            ports: spec.ports,
        })
    }
}
