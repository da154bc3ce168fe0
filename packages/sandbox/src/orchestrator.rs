// ABOUTME: Session orchestrator sequencing resolve, provision, attach and teardown
// ABOUTME: Tracks every created resource and rolls them back on any fatal path

use crate::config::{SandboxConfig, Settings};
use crate::engine::ContainerEngine;
use crate::error::{PrimaryContainerError, Result, SandboxError};
use crate::network::NetworkProvisioner;
use crate::plugins::PluginAttacher;
use crate::primary::PrimaryContainerManager;
use crate::report::{Reporter, SessionEvent};
use crate::resolver::{Environment, EnvironmentResolver};
use crate::teardown::{SessionResources, TeardownCoordinator, TeardownReport};
use crate::terminal::{TerminalBridge, TerminalMode};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

/// How a session that ran to completion ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Everything was removed after the terminal session
    Removed(TeardownReport),
    /// Resources were handed to the operator
    LeftRunning(SessionResources),
}

/// Runs one sandbox session end to end
pub struct Sandbox {
    engine: Arc<dyn ContainerEngine>,
    settings: Settings,
    reporter: Arc<dyn Reporter>,
    terminal: Arc<dyn TerminalMode>,
}

impl Sandbox {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        settings: Settings,
        reporter: Arc<dyn Reporter>,
        terminal: Arc<dyn TerminalMode>,
    ) -> Self {
        Self {
            engine,
            settings,
            reporter,
            terminal,
        }
    }

    /// Provision the sandbox, bridge the operator terminal, then clean up
    ///
    /// On any failure after the first resource exists, every created resource
    /// is removed before the error is returned.
    pub async fn run<R, W>(
        &self,
        config: &SandboxConfig,
        stdin: R,
        stdout: W,
    ) -> Result<SessionOutcome>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let session = self.settings.resource_name(&config.working_directory);
        let labels = self.settings.session_labels(&session);
        info!("Starting sandbox session {}", session);

        let environment = EnvironmentResolver::new(
            self.engine.clone(),
            self.settings.clone(),
            self.reporter.clone(),
        )
        .resolve(config)
        .await?;

        let mut created = SessionResources::default();
        if environment.owned && environment.created_by_session() {
            created.image = Some(environment.image.clone());
        }

        if let Err(cause) = self
            .provision_and_attach(config, &environment, &labels, &mut created, stdin, stdout)
            .await
        {
            return Err(self.roll_back(cause, &created).await);
        }

        let resources = SessionResources {
            image: environment.owned.then(|| environment.image.clone()),
            ..created
        };

        if config.remove_after_use {
            let report = self.teardown_coordinator().teardown(&resources).await?;
            info!("Session {} removed", session);
            Ok(SessionOutcome::Removed(report))
        } else {
            info!("Session {} left running", session);
            self.reporter
                .report(SessionEvent::LeftRunning(resources.clone()));
            Ok(SessionOutcome::LeftRunning(resources))
        }
    }

    async fn provision_and_attach<R, W>(
        &self,
        config: &SandboxConfig,
        environment: &Environment,
        labels: &HashMap<String, String>,
        created: &mut SessionResources,
        stdin: R,
        stdout: W,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        // Only sidecars need a private network
        let network = if config.plugins.is_empty() {
            None
        } else {
            let name = self.settings.network_name(&config.working_directory);
            let id = NetworkProvisioner::new(
                self.engine.clone(),
                self.reporter.clone(),
                labels.clone(),
            )
            .create_network(&name)
            .await?;
            created.network = Some(id.clone());
            Some(id)
        };

        if let Some(network_id) = &network {
            let attacher = PluginAttacher::new(
                self.engine.clone(),
                self.settings.clone(),
                self.reporter.clone(),
                labels.clone(),
            );
            match attacher.attach_plugins(&config.plugins, network_id).await {
                Ok(plugins) => created.plugins = plugins,
                Err(e) => {
                    created.plugins = e.created().to_vec();
                    return Err(e.into());
                }
            }
        }

        let manager = PrimaryContainerManager::new(
            self.engine.clone(),
            self.settings.clone(),
            self.reporter.clone(),
            labels.clone(),
        );
        let primary = match manager
            .start_primary(environment, config, network.as_deref())
            .await
        {
            Ok(primary) => primary,
            Err(e) => {
                if let PrimaryContainerError::StartFailed { container_id, .. } = &e {
                    created.primary = Some(container_id.clone());
                }
                return Err(e.into());
            }
        };
        created.primary = Some(primary.id.clone());

        TerminalBridge::new(
            self.engine.clone(),
            self.settings.clone(),
            self.terminal.clone(),
        )
        .attach(&primary.id, stdin, stdout)
        .await?;

        Ok(())
    }

    async fn roll_back(&self, cause: SandboxError, created: &SessionResources) -> SandboxError {
        if created.is_empty() {
            return cause;
        }

        warn!("Rolling back session after error: {}", cause);
        self.reporter.report(SessionEvent::RollingBack {
            reason: cause.to_string(),
        });

        match self.teardown_coordinator().teardown(created).await {
            Ok(report) => {
                info!("Rolled back {} resource(s)", report.removed.len());
                cause
            }
            Err(leftover) => {
                error!("Rollback incomplete: {}", leftover);
                SandboxError::RolledBack {
                    cause: Box::new(cause),
                    leftover,
                }
            }
        }
    }

    fn teardown_coordinator(&self) -> TeardownCoordinator {
        TeardownCoordinator::new(self.engine.clone(), self.reporter.clone())
    }
}
