// ABOUTME: Sandbox session configuration and naming settings
// ABOUTME: Immutable per-invocation config plus env-overridable naming defaults

use crate::engine::PortPair;
use sndbx_config::constants;
use sndbx_config::env::string_env_or_default;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Where the sandbox image comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// An image reference such as `alpine:latest`
    RemoteImage,
    /// A build recipe file in the host directory
    LocalBuildRecipe,
}

/// Whether teardown removes the image the session ran on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageRetention {
    #[default]
    RemoveWithSession,
    Keep,
}

/// Configuration for one sandbox session, fixed once constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub source_kind: SourceKind,
    /// Image tag or recipe file name
    pub source_reference: String,
    /// Base name of the host directory, used to derive resource names
    pub working_directory: String,
    /// Operator directory: recipe lookup root and bind mount source
    pub host_directory: PathBuf,
    pub remove_after_use: bool,
    pub ports: Vec<PortPair>,
    /// Plugin image references in attach order
    pub plugins: Vec<String>,
    /// `KEY=VALUE` assignments injected into the primary container
    pub env: Vec<String>,
    pub image_retention: ImageRetention,
}

impl SandboxConfig {
    pub fn remote_image(reference: impl Into<String>, host_directory: impl Into<PathBuf>) -> Self {
        Self::new(SourceKind::RemoteImage, reference.into(), host_directory.into())
    }

    pub fn local_recipe(recipe: impl Into<String>, host_directory: impl Into<PathBuf>) -> Self {
        Self::new(SourceKind::LocalBuildRecipe, recipe.into(), host_directory.into())
    }

    fn new(source_kind: SourceKind, source_reference: String, host_directory: PathBuf) -> Self {
        Self {
            source_kind,
            source_reference,
            working_directory: directory_name(&host_directory),
            host_directory,
            remove_after_use: false,
            ports: Vec::new(),
            plugins: Vec::new(),
            env: Vec::new(),
            image_retention: ImageRetention::default(),
        }
    }

    pub fn with_working_directory(mut self, name: impl Into<String>) -> Self {
        self.working_directory = name.into();
        self
    }

    pub fn with_remove_after_use(mut self, remove: bool) -> Self {
        self.remove_after_use = remove;
        self
    }

    pub fn with_ports(mut self, ports: Vec<PortPair>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_plugins(mut self, plugins: Vec<String>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_image_retention(mut self, retention: ImageRetention) -> Self {
        self.image_retention = retention;
        self
    }
}

fn directory_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sandbox".to_string())
}

/// Naming and container layout defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub name_prefix: String,
    pub container_workdir: String,
    pub shell: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name_prefix: constants::DEFAULT_NAME_PREFIX.to_string(),
            container_workdir: constants::DEFAULT_CONTAINER_WORKDIR.to_string(),
            shell: constants::DEFAULT_SHELL.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            name_prefix: string_env_or_default(
                constants::SNDBX_NAME_PREFIX,
                constants::DEFAULT_NAME_PREFIX,
            ),
            container_workdir: string_env_or_default(
                constants::SNDBX_CONTAINER_WORKDIR,
                constants::DEFAULT_CONTAINER_WORKDIR,
            ),
            shell: string_env_or_default(constants::SNDBX_SHELL, constants::DEFAULT_SHELL),
        }
    }

    /// `<prefix>-<suffix>`, with the suffix made safe for engine object names
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name_prefix, sanitize_name(suffix))
    }

    pub fn network_name(&self, working_directory: &str) -> String {
        format!("{}-net", self.resource_name(working_directory))
    }

    /// Container name for a plugin, derived from its image reference
    pub fn plugin_name(&self, reference: &str) -> String {
        self.resource_name(plugin_base_name(reference))
    }

    /// Labels identifying resources created by a session
    pub fn session_labels(&self, session: &str) -> HashMap<String, String> {
        HashMap::from([
            (
                constants::LABEL_CREATED_BY.to_string(),
                constants::LABEL_VALUE.to_string(),
            ),
            (
                constants::LABEL_APP.to_string(),
                constants::LABEL_VALUE.to_string(),
            ),
            (constants::LABEL_SESSION.to_string(), session.to_string()),
        ])
    }

    /// Label filter matching every resource sndbx created
    pub fn ownership_filter() -> String {
        format!("{}={}", constants::LABEL_APP, constants::LABEL_VALUE)
    }
}

/// Repository name of an image reference: no registry, path, tag or digest
pub fn plugin_base_name(reference: &str) -> &str {
    let without_digest = reference.split('@').next().unwrap_or(reference);
    let last_segment = without_digest.rsplit('/').next().unwrap_or(without_digest);
    last_segment.split(':').next().unwrap_or(last_segment)
}

/// Lowercase and reduce to a valid image and container name component
///
/// Characters outside `[a-z0-9._-]` become `-`, each run of separators
/// collapses to its first one, and the result starts and ends alphanumeric.
fn sanitize_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut pending = None;

    for c in raw.chars().map(|c| c.to_ascii_lowercase()) {
        if c.is_ascii_alphanumeric() {
            if let Some(separator) = pending.take() {
                if !name.is_empty() {
                    name.push(separator);
                }
            }
            name.push(c);
        } else {
            let separator = if matches!(c, '_' | '.' | '-') { c } else { '-' };
            pending.get_or_insert(separator);
        }
    }

    if name.is_empty() {
        "sandbox".to_string()
    } else {
        name
    }
}
