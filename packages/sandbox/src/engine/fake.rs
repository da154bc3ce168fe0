// ABOUTME: In-memory container engine that records every call
// ABOUTME: Scriptable failures and exec output for exercising the lifecycle without a daemon

use super::{
    BuildEvent, BuildRequest, ContainerEngine, ContainerSpec, EngineError, ExecChannel, ExecSpec,
    ImageSummary, NetworkSpec, PullProgress, Result,
};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::Notify;

/// Engine operation, used to script failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    ListImages,
    PullImage,
    BuildImage,
    ImageOs,
    RemoveImage,
    CreateNetwork,
    RemoveNetwork,
    ListNetworks,
    CreateContainer,
    StartContainer,
    RemoveContainer,
    ListContainers,
    CreateExec,
    AttachExec,
}

/// A recorded engine call with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    ListImages,
    PullImage(String),
    BuildImage(BuildRequest),
    ImageOs(String),
    RemoveImage(String),
    CreateNetwork(NetworkSpec),
    RemoveNetwork(String),
    ListNetworks(String),
    CreateContainer(ContainerSpec),
    StartContainer(String),
    RemoveContainer { id: String, force: bool },
    ListContainers(String),
    CreateExec { container_id: String, spec: ExecSpec },
    AttachExec(String),
}

impl EngineCall {
    pub fn op(&self) -> EngineOp {
        match self {
            EngineCall::ListImages => EngineOp::ListImages,
            EngineCall::PullImage(_) => EngineOp::PullImage,
            EngineCall::BuildImage(_) => EngineOp::BuildImage,
            EngineCall::ImageOs(_) => EngineOp::ImageOs,
            EngineCall::RemoveImage(_) => EngineOp::RemoveImage,
            EngineCall::CreateNetwork(_) => EngineOp::CreateNetwork,
            EngineCall::RemoveNetwork(_) => EngineOp::RemoveNetwork,
            EngineCall::ListNetworks(_) => EngineOp::ListNetworks,
            EngineCall::CreateContainer(_) => EngineOp::CreateContainer,
            EngineCall::StartContainer(_) => EngineOp::StartContainer,
            EngineCall::RemoveContainer { .. } => EngineOp::RemoveContainer,
            EngineCall::ListContainers(_) => EngineOp::ListContainers,
            EngineCall::CreateExec { .. } => EngineOp::CreateExec,
            EngineCall::AttachExec(_) => EngineOp::AttachExec,
        }
    }
}

struct FailureRule {
    op: EngineOp,
    key: Option<String>,
    remaining: usize,
}

#[derive(Default)]
struct State {
    calls: Vec<EngineCall>,
    failures: Vec<FailureRule>,
    images: Vec<ImageSummary>,
    containers: HashMap<String, (ContainerSpec, bool)>,
    networks: HashMap<String, NetworkSpec>,
    next_id: usize,
    empty_network_id: bool,
    os_type: Option<String>,
    pull_progress: Vec<PullProgress>,
    build_events: Vec<BuildEvent>,
    exec_output: Vec<Vec<u8>>,
    exec_output_error: Option<io::ErrorKind>,
    hold_output: bool,
    broken_input: bool,
}

impl State {
    fn next_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", kind, self.next_id)
    }

    /// Consume a scripted failure for this call, if one applies
    fn check(&mut self, op: EngineOp, key: &str) -> Result<()> {
        let rule = self.failures.iter_mut().find(|rule| {
            rule.op == op
                && rule.remaining > 0
                && rule.key.as_deref().map(|k| k == key).unwrap_or(true)
        });

        match rule {
            Some(rule) => {
                rule.remaining -= 1;
                Err(scripted_error(op, key))
            }
            None => Ok(()),
        }
    }

    fn has_image(&self, reference: &str) -> bool {
        self.images
            .iter()
            .any(|image| image.tags.iter().any(|tag| tag == reference))
    }

    fn add_image(&mut self, reference: &str) {
        if !self.has_image(reference) {
            let id = self.next_id("sha256");
            self.images.push(ImageSummary {
                id,
                tags: vec![reference.to_string()],
            });
        }
    }
}

fn scripted_error(op: EngineOp, key: &str) -> EngineError {
    let message = format!("scripted {:?} failure for '{}'", op, key);
    match op {
        EngineOp::ListImages
        | EngineOp::PullImage
        | EngineOp::BuildImage
        | EngineOp::ImageOs
        | EngineOp::RemoveImage => EngineError::Image(message),
        EngineOp::CreateNetwork | EngineOp::RemoveNetwork | EngineOp::ListNetworks => {
            EngineError::Network(message)
        }
        EngineOp::CreateContainer
        | EngineOp::StartContainer
        | EngineOp::RemoveContainer
        | EngineOp::ListContainers => EngineError::Container(message),
        EngineOp::CreateExec | EngineOp::AttachExec => EngineError::Exec(message),
    }
}

/// Recording engine double
///
/// Behaves like a small Docker: creating a container from an image that is
/// not stored locally fails with `NotFound`, pulls and builds add the tag,
/// removals delete what they name.
pub struct FakeEngine {
    state: Mutex<State>,
    stdin: Arc<Mutex<Vec<u8>>>,
    input_closed: Arc<AtomicBool>,
    closed_signal: Arc<Notify>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        let state = State {
            pull_progress: vec![
                PullProgress {
                    status: Some("Downloading".to_string()),
                    current: Some(50),
                    total: Some(100),
                },
                PullProgress {
                    status: Some("Download complete".to_string()),
                    current: Some(100),
                    total: Some(100),
                },
            ],
            build_events: vec![BuildEvent {
                stream: Some("Successfully built".to_string()),
                error: None,
            }],
            os_type: Some("linux".to_string()),
            hold_output: true,
            ..Default::default()
        };

        Self {
            state: Mutex::new(state),
            stdin: Arc::new(Mutex::new(Vec::new())),
            input_closed: Arc::new(AtomicBool::new(false)),
            closed_signal: Arc::new(Notify::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Preload a locally stored image tag
    pub fn with_image(self, reference: &str) -> Self {
        self.state().add_image(reference);
        self
    }

    /// Fail the next `times` calls of `op`
    pub fn fail(self, op: EngineOp, times: usize) -> Self {
        self.state().failures.push(FailureRule {
            op,
            key: None,
            remaining: times,
        });
        self
    }

    /// Fail the next `times` calls of `op` whose name, id or reference is `key`
    pub fn fail_on(self, op: EngineOp, key: &str, times: usize) -> Self {
        self.state().failures.push(FailureRule {
            op,
            key: Some(key.to_string()),
            remaining: times,
        });
        self
    }

    /// Report success with an empty id from network creation
    pub fn with_empty_network_id(self) -> Self {
        self.state().empty_network_id = true;
        self
    }

    pub fn with_build_events(self, events: Vec<BuildEvent>) -> Self {
        self.state().build_events = events;
        self
    }

    pub fn with_pull_progress(self, events: Vec<PullProgress>) -> Self {
        self.state().pull_progress = events;
        self
    }

    /// Chunks the attached exec writes to its output
    ///
    /// With `hold_until_input_closed`, the output stays open after the chunks
    /// until the input side is shut down, like a shell waiting for EOF.
    pub fn with_exec_output(self, chunks: Vec<&[u8]>, hold_until_input_closed: bool) -> Self {
        {
            let mut state = self.state();
            state.exec_output = chunks.into_iter().map(<[u8]>::to_vec).collect();
            state.hold_output = hold_until_input_closed;
        }
        self
    }

    /// End the attached exec output with a transport error after its chunks
    pub fn with_exec_output_error(self, kind: io::ErrorKind) -> Self {
        self.state().exec_output_error = Some(kind);
        self
    }

    /// Make every write to the attached exec input fail with a broken pipe
    pub fn with_broken_exec_input(self) -> Self {
        self.state().broken_input = true;
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: EngineOp) -> usize {
        self.state().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn ops(&self) -> Vec<EngineOp> {
        self.state().calls.iter().map(EngineCall::op).collect()
    }

    /// Ids of containers that currently exist
    pub fn containers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().containers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn container_spec(&self, container_id: &str) -> Option<ContainerSpec> {
        self.state()
            .containers
            .get(container_id)
            .map(|(spec, _)| spec.clone())
    }

    pub fn is_running(&self, container_id: &str) -> bool {
        self.state()
            .containers
            .get(container_id)
            .map(|(_, running)| *running)
            .unwrap_or(false)
    }

    /// Ids of networks that currently exist
    pub fn networks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().networks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.state().has_image(reference)
    }

    /// Bytes written to the attached exec input
    pub fn stdin_received(&self) -> Vec<u8> {
        self.stdin.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether the exec input was half-closed
    pub fn input_closed(&self) -> bool {
        self.input_closed.load(Ordering::SeqCst)
    }

    fn record(&self, call: EngineCall, key: &str) -> Result<MutexGuard<'_, State>> {
        let op = call.op();
        let mut state = self.state();
        state.calls.push(call);
        state.check(op, key)?;
        Ok(state)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let state = self.record(EngineCall::ListImages, "")?;
        Ok(state.images.clone())
    }

    fn pull_image<'a>(&'a self, reference: &'a str) -> BoxStream<'a, Result<PullProgress>> {
        let result = self
            .record(EngineCall::PullImage(reference.to_string()), reference)
            .map(|mut state| {
                state.add_image(reference);
                state.pull_progress.clone()
            });

        match result {
            Ok(events) => stream::iter(events.into_iter().map(Ok)).boxed(),
            Err(e) => stream::iter(vec![Err(e)]).boxed(),
        }
    }

    fn build_image(&self, request: BuildRequest) -> BoxStream<'_, Result<BuildEvent>> {
        let tag = request.tag.clone();
        let result = self
            .record(EngineCall::BuildImage(request), &tag)
            .map(|mut state| {
                let events = state.build_events.clone();
                if events.iter().all(|event| event.error.is_none()) {
                    state.add_image(&tag);
                }
                events
            });

        match result {
            Ok(events) => stream::iter(events.into_iter().map(Ok)).boxed(),
            Err(e) => stream::iter(vec![Err(e)]).boxed(),
        }
    }

    async fn image_os(&self, reference: &str) -> Result<Option<String>> {
        let state = self.record(EngineCall::ImageOs(reference.to_string()), reference)?;
        Ok(state.os_type.clone())
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        let mut state = self.record(EngineCall::RemoveImage(reference.to_string()), reference)?;
        if !state.has_image(reference) {
            return Err(EngineError::NotFound(format!("No such image: {}", reference)));
        }
        state
            .images
            .retain(|image| !image.tags.iter().any(|tag| tag == reference));
        Ok(())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<String> {
        let mut state = self.record(EngineCall::CreateNetwork(spec.clone()), &spec.name)?;
        if state.empty_network_id {
            return Ok(String::new());
        }
        let id = state.next_id("network");
        state.networks.insert(id.clone(), spec.clone());
        Ok(id)
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        let mut state = self.record(EngineCall::RemoveNetwork(network_id.to_string()), network_id)?;
        let in_use = state
            .containers
            .values()
            .any(|(spec, _)| spec.network.as_deref() == Some(network_id));
        if in_use {
            return Err(EngineError::Network(format!(
                "network {} has active endpoints",
                network_id
            )));
        }
        state
            .networks
            .remove(network_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(format!("network {} not found", network_id)))
    }

    async fn list_labeled_networks(&self, label: &str) -> Result<Vec<String>> {
        let state = self.record(EngineCall::ListNetworks(label.to_string()), label)?;
        let mut ids: Vec<String> = state
            .networks
            .iter()
            .filter(|(_, spec)| has_label(&spec.labels, label))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.record(EngineCall::CreateContainer(spec.clone()), &spec.name)?;
        if !state.has_image(&spec.image) {
            return Err(EngineError::NotFound(format!(
                "No such image: {}",
                spec.image
            )));
        }
        if state.containers.values().any(|(c, _)| c.name == spec.name) {
            return Err(EngineError::Container(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        let id = state.next_id("container");
        state.containers.insert(id.clone(), (spec.clone(), false));
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        let mut state =
            self.record(EngineCall::StartContainer(container_id.to_string()), container_id)?;
        match state.containers.get_mut(container_id) {
            Some((_, running)) => {
                *running = true;
                Ok(())
            }
            None => Err(EngineError::NotFound(format!(
                "No such container: {}",
                container_id
            ))),
        }
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        let mut state = self.record(
            EngineCall::RemoveContainer {
                id: container_id.to_string(),
                force,
            },
            container_id,
        )?;
        let running = state
            .containers
            .get(container_id)
            .map(|(_, running)| *running);
        match running {
            Some(true) if !force => Err(EngineError::Container(format!(
                "container {} is running",
                container_id
            ))),
            Some(_) => {
                state.containers.remove(container_id);
                Ok(())
            }
            None => Err(EngineError::NotFound(format!(
                "No such container: {}",
                container_id
            ))),
        }
    }

    async fn list_labeled_containers(&self, label: &str) -> Result<Vec<String>> {
        let state = self.record(EngineCall::ListContainers(label.to_string()), label)?;
        let mut ids: Vec<String> = state
            .containers
            .iter()
            .filter(|(_, (spec, _))| has_label(&spec.labels, label))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> Result<String> {
        let mut state = self.record(
            EngineCall::CreateExec {
                container_id: container_id.to_string(),
                spec: spec.clone(),
            },
            container_id,
        )?;
        if !matches!(state.containers.get(container_id), Some((_, true))) {
            return Err(EngineError::Exec(format!(
                "container {} is not running",
                container_id
            )));
        }
        Ok(state.next_id("exec"))
    }

    async fn attach_exec(&self, exec_id: &str, _tty: bool) -> Result<ExecChannel> {
        let (chunks, output_error, hold, broken) = {
            let state = self.record(EngineCall::AttachExec(exec_id.to_string()), exec_id)?;
            (
                state.exec_output.clone(),
                state.exec_output_error,
                state.hold_output,
                state.broken_input,
            )
        };

        let mut items: Vec<Result<Vec<u8>>> = chunks.into_iter().map(Ok).collect();
        if let Some(kind) = output_error {
            items.push(Err(EngineError::Io(io::Error::new(
                kind,
                "exec output stream failed",
            ))));
        }

        let written = stream::iter(items);
        let output = if hold && output_error.is_none() {
            let signal = self.closed_signal.clone();
            let held = stream::once(async move { signal.notified().await })
                .filter_map(|()| future::ready(None::<Result<Vec<u8>>>));
            written.chain(held).boxed()
        } else {
            written.boxed()
        };

        let input = RecordingInput {
            buffer: self.stdin.clone(),
            closed: self.input_closed.clone(),
            signal: self.closed_signal.clone(),
            broken,
        };

        Ok(ExecChannel {
            output,
            input: Box::pin(input),
        })
    }
}

fn has_label(labels: &HashMap<String, String>, filter: &str) -> bool {
    match filter.split_once('=') {
        Some((key, value)) => labels.get(key).map(|v| v == value).unwrap_or(false),
        None => labels.contains_key(filter),
    }
}

/// Exec input that records written bytes and signals on shutdown
struct RecordingInput {
    buffer: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    signal: Arc<Notify>,
    broken: bool,
}

impl AsyncWrite for RecordingInput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.broken {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.closed.store(true, Ordering::SeqCst);
        self.signal.notify_one();
        Poll::Ready(Ok(()))
    }
}
