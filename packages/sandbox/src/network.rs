// ABOUTME: Private per-session network provisioning
// ABOUTME: Creates an attachable bridge network labeled for ownership attribution

use crate::engine::{ContainerEngine, NetworkSpec};
use crate::error::NetworkError;
use crate::report::{Reporter, SessionEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct NetworkProvisioner {
    engine: Arc<dyn ContainerEngine>,
    reporter: Arc<dyn Reporter>,
    labels: HashMap<String, String>,
}

impl NetworkProvisioner {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        reporter: Arc<dyn Reporter>,
        labels: HashMap<String, String>,
    ) -> Self {
        Self {
            engine,
            reporter,
            labels,
        }
    }

    /// Create the session network and return its id
    pub async fn create_network(&self, name: &str) -> Result<String, NetworkError> {
        if name.trim().is_empty() {
            return Err(NetworkError::EmptyName);
        }

        let spec = NetworkSpec {
            name: name.to_string(),
            driver: "bridge".to_string(),
            attachable: true,
            labels: self.labels.clone(),
        };

        debug!("Creating network {}", name);
        let id = self.engine.create_network(&spec).await.map_err(|e| {
            error!("Failed to create network {}: {}", name, e);
            NetworkError::CreateFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        if id.is_empty() {
            return Err(NetworkError::CreateFailed {
                name: name.to_string(),
                reason: "engine returned an empty network id".to_string(),
            });
        }

        info!("Created network {} ({})", name, id);
        self.reporter.report(SessionEvent::NetworkCreated {
            name: name.to_string(),
            id: id.clone(),
        });

        Ok(id)
    }
}
