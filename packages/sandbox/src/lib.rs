// ABOUTME: Sandbox lifecycle orchestration over a container engine
// ABOUTME: Resolves an image, wires sidecars on a private network, bridges a terminal, tears down

pub mod build_context;
pub mod config;
pub mod engine;
pub mod error;
pub mod janitor;
pub mod network;
pub mod orchestrator;
pub mod plugins;
pub mod primary;
pub mod report;
pub mod resolver;
pub mod teardown;
pub mod terminal;

pub use config::{ImageRetention, SandboxConfig, Settings, SourceKind};
pub use engine::{ContainerEngine, DockerEngine, EngineError, PortPair};
pub use error::{
    NetworkError, PluginAttachError, PrimaryContainerError, ResolutionError, Result,
    SandboxError, TeardownError, TeardownFailure, TeardownStep, TerminalError,
};
pub use janitor::Janitor;
pub use orchestrator::{Sandbox, SessionOutcome};
pub use plugins::Plugin;
pub use primary::PrimaryContainer;
pub use report::{Reporter, SessionEvent, SilentReporter};
pub use resolver::{Environment, ImageOrigin};
pub use teardown::{SessionResources, TeardownReport};
pub use terminal::{CrosstermTerminal, DetachedTerminal, TerminalMode};
