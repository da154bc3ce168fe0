// ABOUTME: Error types for sandbox provisioning and teardown
// ABOUTME: One error kind per lifecycle component, aggregated into SandboxError

use crate::engine::EngineError;
use crate::plugins::Plugin;
use std::fmt;
use thiserror::Error;

/// Failures while turning the configured source into a runnable image
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("No image or recipe reference was provided")]
    MissingReference,

    #[error("Recipe {recipe} not found in {directory}")]
    RecipeNotFound { recipe: String, directory: String },

    #[error("Cannot read directory {directory}: {source}")]
    ListingFailed {
        directory: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create build context from {directory}: {source}")]
    BuildContext {
        directory: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list images: {0}")]
    ListFailed(#[source] EngineError),

    #[error("Failed to pull image {reference}: {source}")]
    PullFailed {
        reference: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to build image {tag}: {reason}")]
    BuildFailed { tag: String, reason: String },
}

/// Failures while creating the session network
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network name cannot be empty")]
    EmptyName,

    #[error("Failed to create network {name}: {reason}")]
    CreateFailed { name: String, reason: String },
}

/// Failures while attaching sidecar containers
///
/// Every variant carries the plugins created before the failure so the caller
/// can reconcile them.
#[derive(Error, Debug)]
pub enum PluginAttachError {
    #[error("Failed to pull plugin image {reference}: {source}")]
    PullFailed {
        reference: String,
        #[source]
        source: EngineError,
        created: Vec<Plugin>,
    },

    #[error("Failed to create plugin container for {reference}: {source}")]
    CreateFailed {
        reference: String,
        #[source]
        source: EngineError,
        created: Vec<Plugin>,
    },

    #[error("Failed to start plugin container {container_id} ({reference}): {source}")]
    StartFailed {
        reference: String,
        container_id: String,
        #[source]
        source: EngineError,
        created: Vec<Plugin>,
    },
}

impl PluginAttachError {
    /// Plugin containers that exist in the engine despite the failure
    pub fn created(&self) -> &[Plugin] {
        match self {
            PluginAttachError::PullFailed { created, .. }
            | PluginAttachError::CreateFailed { created, .. }
            | PluginAttachError::StartFailed { created, .. } => created,
        }
    }
}

/// Failures while creating or starting the primary container
#[derive(Error, Debug)]
pub enum PrimaryContainerError {
    #[error("Failed to determine host directory: {0}")]
    HostDirectory(#[source] std::io::Error),

    #[error("Failed to create container {name}: {source}")]
    CreateFailed {
        name: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to start container {container_id}: {source}")]
    StartFailed {
        container_id: String,
        #[source]
        source: EngineError,
    },
}

/// Failures of the interactive terminal session
#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("Failed to switch terminal to raw mode: {0}")]
    RawMode(#[source] std::io::Error),

    #[error("Error creating exec instance in {container_id}: {source}")]
    ExecCreate {
        container_id: String,
        #[source]
        source: EngineError,
    },

    #[error("Error attaching to exec instance {exec_id}: {source}")]
    Attach {
        exec_id: String,
        #[source]
        source: EngineError,
    },

    #[error("Input stream failed: {0}")]
    InputPump(#[source] std::io::Error),

    #[error("Output stream failed: {0}")]
    OutputPump(#[source] std::io::Error),
}

/// Lifecycle step a teardown failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    PrimaryContainer,
    Image,
    Plugin,
    Network,
    /// A labeled container found by cleanup, primary or plugin
    Container,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TeardownStep::PrimaryContainer => "primary container",
            TeardownStep::Image => "image",
            TeardownStep::Plugin => "plugin container",
            TeardownStep::Network => "network",
            TeardownStep::Container => "container",
        };
        f.write_str(label)
    }
}

/// A single removal that did not succeed
#[derive(Debug)]
pub struct TeardownFailure {
    pub step: TeardownStep,
    pub resource: String,
    pub source: EngineError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.step, self.resource, self.source)
    }
}

/// Failures while removing session resources
#[derive(Error, Debug)]
pub enum TeardownError {
    #[error("Partial teardown, {} resource(s) remain: {}", failures.len(), describe_failures(failures))]
    Partial { failures: Vec<TeardownFailure> },
}

impl TeardownError {
    pub fn failures(&self) -> &[TeardownFailure] {
        match self {
            TeardownError::Partial { failures } => failures,
        }
    }
}

fn describe_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Main error type for a sandbox session
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Plugin(#[from] PluginAttachError),

    #[error(transparent)]
    Primary(#[from] PrimaryContainerError),

    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error(transparent)]
    Teardown(#[from] TeardownError),

    /// A fatal error whose rollback could not remove everything
    #[error("{cause} (rollback incomplete: {leftover})")]
    RolledBack {
        cause: Box<SandboxError>,
        leftover: TeardownError,
    },
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
