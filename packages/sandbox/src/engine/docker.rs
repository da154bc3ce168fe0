// ABOUTME: Docker engine implementation backed by the bollard client
// ABOUTME: Translates engine requests into Docker Engine API calls and maps their errors

use super::{
    BuildEvent, BuildRequest, ContainerEngine, ContainerSpec, EngineError, ExecChannel, ExecSpec,
    ImageSummary, NetworkSpec, PullProgress, Result,
};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
        StartContainerOptions,
    },
    errors::Error as BollardError,
    exec::{CreateExecOptions, StartExecOptions, StartExecResults},
    image::{BuildImageOptions, CreateImageOptions, ListImagesOptions, RemoveImageOptions},
    models::{HostConfig, Mount, MountTypeEnum, PortBinding},
    network::{CreateNetworkOptions, ListNetworksOptions},
    Docker,
};
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use tracing::{debug, error, info};

pub struct DockerEngine {
    client: Docker,
}

impl DockerEngine {
    /// Connect using environment defaults (honors DOCKER_HOST) and verify with a ping
    pub async fn connect() -> Result<Self> {
        let client = Docker::connect_with_defaults().map_err(|e| {
            EngineError::Connection(format!("Cannot connect to the Docker daemon: {}", e))
        })?;

        client.ping().await.map_err(|e| {
            error!("Failed to ping Docker daemon: {}", e);
            EngineError::Connection(format!("Docker daemon is not responding: {}", e))
        })?;

        info!("Successfully connected to Docker daemon");
        Ok(Self { client })
    }

    /// Convert our container spec to bollard config
    fn to_bollard_config(spec: &ContainerSpec) -> Config<String> {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();

        for port in &spec.ports {
            let container_port = format!("{}/tcp", port.container);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            let binding = vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(port.host.to_string()),
            }];
            port_bindings.insert(container_port, Some(binding));
        }

        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|m| Mount {
                typ: Some(MountTypeEnum::BIND),
                source: Some(m.host_path.clone()),
                target: Some(m.container_path.clone()),
                read_only: Some(m.readonly),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            mounts: if mounts.is_empty() { None } else { Some(mounts) },
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            network_mode: spec.network.clone(),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            tty: Some(spec.tty),
            open_stdin: Some(spec.open_stdin),
            working_dir: spec.working_dir.clone(),
            cmd: spec.command.clone(),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            labels: Some(spec.labels.clone()),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

/// Map a bollard error, keeping 404s and transport I/O failures distinguishable
fn classify(e: BollardError, kind: fn(String) -> EngineError) -> EngineError {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::IOError { err } => EngineError::Io(err),
        other => kind(other.to_string()),
    }
}

fn label_filter(label: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([("label".to_string(), vec![label.to_string()])])
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };

        let images = self
            .client
            .list_images(Some(options))
            .await
            .map_err(|e| classify(e, EngineError::Image))?;

        Ok(images
            .into_iter()
            .map(|image| ImageSummary {
                id: image.id,
                tags: image.repo_tags,
            })
            .collect())
    }

    fn pull_image<'a>(&'a self, reference: &'a str) -> BoxStream<'a, Result<PullProgress>> {
        debug!("Pulling image: {}", reference);

        let options = CreateImageOptions {
            from_image: reference.to_string(),
            ..Default::default()
        };

        self.client
            .create_image(Some(options), None, None)
            .map(|item| match item {
                Ok(info) => match info.error {
                    Some(error) => Err(EngineError::Image(error)),
                    None => {
                        let detail = info.progress_detail.as_ref();
                        Ok(PullProgress {
                            status: info.status,
                            current: detail.and_then(|d| d.current),
                            total: detail.and_then(|d| d.total),
                        })
                    }
                },
                Err(e) => Err(classify(e, EngineError::Image)),
            })
            .boxed()
    }

    fn build_image(&self, request: BuildRequest) -> BoxStream<'_, Result<BuildEvent>> {
        debug!(
            "Building image {} from {} ({} byte context)",
            request.tag,
            request.recipe_file,
            request.context.len()
        );

        let options = BuildImageOptions {
            dockerfile: request.recipe_file,
            t: request.tag,
            rm: true,
            ..Default::default()
        };

        self.client
            .build_image(options, None, Some(request.context.into()))
            .map(|item| match item {
                Ok(info) => Ok(BuildEvent {
                    stream: info.stream,
                    error: info.error,
                }),
                Err(e) => Err(classify(e, EngineError::Image)),
            })
            .boxed()
    }

    async fn image_os(&self, reference: &str) -> Result<Option<String>> {
        let inspect = self
            .client
            .inspect_image(reference)
            .await
            .map_err(|e| classify(e, EngineError::Image))?;

        Ok(inspect.os)
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        info!("Removing image: {}", reference);

        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };

        self.client
            .remove_image(reference, Some(options), None)
            .await
            .map_err(|e| classify(e, EngineError::Image))?;

        Ok(())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<String> {
        info!("Creating network: {}", spec.name);

        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            attachable: spec.attachable,
            labels: spec.labels.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .create_network(options)
            .await
            .map_err(|e| classify(e, EngineError::Network))?;

        Ok(response.id)
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        info!("Removing network: {}", network_id);

        self.client
            .remove_network(network_id)
            .await
            .map_err(|e| classify(e, EngineError::Network))
    }

    async fn list_labeled_networks(&self, label: &str) -> Result<Vec<String>> {
        let options = ListNetworksOptions {
            filters: label_filter(label),
        };

        let networks = self
            .client
            .list_networks(Some(options))
            .await
            .map_err(|e| classify(e, EngineError::Network))?;

        Ok(networks.into_iter().filter_map(|n| n.id).collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        info!("Creating container: {}", spec.name);

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let container = self
            .client
            .create_container(Some(options), Self::to_bollard_config(spec))
            .await
            .map_err(|e| classify(e, EngineError::Container))?;

        debug!("Created container: {}", container.id);
        Ok(container.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        info!("Starting container: {}", container_id);

        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| classify(e, EngineError::Container))
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        info!("Removing container: {} (force: {})", container_id, force);

        let options = RemoveContainerOptions {
            force,
            v: true, // Remove anonymous volumes
            ..Default::default()
        };

        self.client
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| classify(e, EngineError::Container))
    }

    async fn list_labeled_containers(&self, label: &str) -> Result<Vec<String>> {
        let options = ListContainersOptions {
            all: true,
            filters: label_filter(label),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| classify(e, EngineError::Container))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> Result<String> {
        debug!(
            "Creating exec in container {}: {:?}",
            container_id, spec.command
        );

        let options = CreateExecOptions {
            cmd: Some(spec.command.clone()),
            attach_stdin: Some(spec.attach_stdio),
            attach_stdout: Some(spec.attach_stdio),
            attach_stderr: Some(spec.attach_stdio),
            tty: Some(spec.tty),
            ..Default::default()
        };

        let exec = self
            .client
            .create_exec(container_id, options)
            .await
            .map_err(|e| classify(e, EngineError::Exec))?;

        Ok(exec.id)
    }

    async fn attach_exec(&self, exec_id: &str, tty: bool) -> Result<ExecChannel> {
        let options = StartExecOptions {
            detach: false,
            tty,
            output_capacity: None,
        };

        let started = self
            .client
            .start_exec(exec_id, Some(options))
            .await
            .map_err(|e| classify(e, EngineError::Exec))?;

        match started {
            StartExecResults::Attached { output, input } => Ok(ExecChannel {
                output: output
                    .map(|chunk| {
                        chunk
                            .map(|log| log.into_bytes().to_vec())
                            .map_err(|e| classify(e, EngineError::Exec))
                    })
                    .boxed(),
                input,
            }),
            StartExecResults::Detached => Err(EngineError::Exec(
                "Exec was detached unexpectedly".to_string(),
            )),
        }
    }
}
