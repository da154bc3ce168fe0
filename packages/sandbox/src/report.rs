// ABOUTME: Operator-facing progress events emitted during a session
// ABOUTME: Reporter trait decouples lifecycle steps from how progress is rendered

use crate::error::TeardownStep;
use crate::teardown::SessionResources;
use std::sync::Mutex;

/// Something the operator may want to see; advisory only
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ImageFound {
        reference: String,
    },
    PullStarted {
        reference: String,
    },
    PullProgress {
        reference: String,
        current: i64,
        total: i64,
    },
    PullFinished {
        reference: String,
    },
    ImageBuilt {
        tag: String,
        recipe: String,
        os_type: Option<String>,
    },
    NetworkCreated {
        name: String,
        id: String,
    },
    PluginCreated {
        reference: String,
        container_id: String,
    },
    PluginStarted {
        reference: String,
        container_id: String,
    },
    PluginReachable {
        reference: String,
        name: String,
        network: String,
    },
    ContainerCreated {
        id: String,
    },
    ContainerStarted {
        id: String,
    },
    Removed {
        step: TeardownStep,
        resource: String,
    },
    RollingBack {
        reason: String,
    },
    /// Session ended without removal; resources are handed to the operator
    LeftRunning(SessionResources),
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: SessionEvent);
}

/// Discards every event
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn report(&self, _event: SessionEvent) {}
}

/// Keeps every event in order, for assertions
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: SessionEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
