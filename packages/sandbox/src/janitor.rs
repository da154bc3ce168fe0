// ABOUTME: Cleanup of sandbox resources left behind by earlier sessions
// ABOUTME: Removes every container then every network carrying the sndbx ownership label

use crate::config::Settings;
use crate::engine::ContainerEngine;
use crate::error::{TeardownError, TeardownFailure, TeardownStep};
use crate::report::{Reporter, SessionEvent};
use crate::teardown::TeardownReport;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Janitor {
    engine: Arc<dyn ContainerEngine>,
    reporter: Arc<dyn Reporter>,
}

impl Janitor {
    pub fn new(engine: Arc<dyn ContainerEngine>, reporter: Arc<dyn Reporter>) -> Self {
        Self { engine, reporter }
    }

    /// Force-remove labeled containers, then remove labeled networks
    ///
    /// Keeps going after individual failures and reports them together.
    pub async fn clear(&self) -> Result<TeardownReport, TeardownError> {
        let filter = Settings::ownership_filter();
        let mut report = TeardownReport::default();
        let mut failures = Vec::new();

        match self.engine.list_labeled_containers(&filter).await {
            Ok(ids) => {
                for id in ids {
                    match self.engine.remove_container(&id, true).await {
                        Ok(()) => self.removed(TeardownStep::Container, id, &mut report),
                        Err(e) if e.is_not_found() => {}
                        Err(source) => {
                            warn!("Failed to remove container {}: {}", id, source);
                            failures.push(TeardownFailure {
                                step: TeardownStep::Container,
                                resource: id,
                                source,
                            });
                        }
                    }
                }
            }
            Err(source) => failures.push(TeardownFailure {
                step: TeardownStep::Container,
                resource: filter.clone(),
                source,
            }),
        }

        match self.engine.list_labeled_networks(&filter).await {
            Ok(ids) => {
                for id in ids {
                    match self.engine.remove_network(&id).await {
                        Ok(()) => self.removed(TeardownStep::Network, id, &mut report),
                        Err(e) if e.is_not_found() => {}
                        Err(source) => {
                            warn!("Failed to remove network {}: {}", id, source);
                            failures.push(TeardownFailure {
                                step: TeardownStep::Network,
                                resource: id,
                                source,
                            });
                        }
                    }
                }
            }
            Err(source) => failures.push(TeardownFailure {
                step: TeardownStep::Network,
                resource: filter,
                source,
            }),
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(TeardownError::Partial { failures })
        }
    }

    fn removed(&self, step: TeardownStep, resource: String, report: &mut TeardownReport) {
        info!("Removed {} {}", step, resource);
        self.reporter.report(SessionEvent::Removed {
            step,
            resource: resource.clone(),
        });
        report.removed.push((step, resource));
    }
}
