// ABOUTME: Container engine trait and the request/response types it exchanges
// ABOUTME: Abstract interface over image, network, container and exec operations

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncWrite;

pub mod docker;
pub mod fake;

pub use docker::DockerEngine;
pub use fake::FakeEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Exec error: {0}")]
    Exec(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A locally stored image and every tag pointing at it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSummary {
    pub id: String,
    pub tags: Vec<String>,
}

/// One progress message emitted while pulling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullProgress {
    pub status: Option<String>,
    pub current: Option<i64>,
    pub total: Option<i64>,
}

/// One message emitted while building
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEvent {
    pub stream: Option<String>,
    pub error: Option<String>,
}

/// Image build submission: a tar archive plus the recipe inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub context: Vec<u8>,
    pub recipe_file: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub attachable: bool,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host_path: String,
    pub container_path: String,
    pub readonly: bool,
}

/// Host port bound to a container port, always TCP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortPair {
    pub host: u16,
    pub container: u16,
}

impl PortPair {
    /// Same port number on both sides
    pub fn same(port: u16) -> Self {
        Self {
            host: port,
            container: port,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub tty: bool,
    pub open_stdin: bool,
    pub working_dir: Option<String>,
    pub command: Option<Vec<String>>,
    pub mounts: Vec<BindMount>,
    pub ports: Vec<PortPair>,
    pub env: Vec<String>,
    pub network: Option<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    pub command: Vec<String>,
    pub tty: bool,
    pub attach_stdio: bool,
}

/// Live duplex stream of an attached exec instance
pub struct ExecChannel {
    pub output: BoxStream<'static, Result<Vec<u8>>>,
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}

/// Operations the sandbox lifecycle needs from a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List local images with their tags
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    /// Pull an image, yielding progress until the pull completes
    fn pull_image<'a>(&'a self, reference: &'a str) -> BoxStream<'a, Result<PullProgress>>;

    /// Build an image from a tar context, yielding build output
    fn build_image(&self, request: BuildRequest) -> BoxStream<'_, Result<BuildEvent>>;

    /// Operating system the image targets, when the engine reports one
    async fn image_os(&self, reference: &str) -> Result<Option<String>>;

    /// Remove an image by reference
    async fn remove_image(&self, reference: &str) -> Result<()>;

    /// Create a network and return its id
    async fn create_network(&self, spec: &NetworkSpec) -> Result<String>;

    /// Remove a network by id
    async fn remove_network(&self, network_id: &str) -> Result<()>;

    /// Ids of networks carrying the given `key=value` label
    async fn list_labeled_networks(&self, label: &str) -> Result<Vec<String>>;

    /// Create a container and return its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a created container
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Remove a container
    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;

    /// Ids of containers, running or not, carrying the given `key=value` label
    async fn list_labeled_containers(&self, label: &str) -> Result<Vec<String>>;

    /// Create an exec instance and return its id
    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> Result<String>;

    /// Start an exec instance attached to a duplex stream
    async fn attach_exec(&self, exec_id: &str, tty: bool) -> Result<ExecChannel>;
}
