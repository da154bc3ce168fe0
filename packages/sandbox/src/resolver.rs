// ABOUTME: Environment resolution from a remote image reference or a local build recipe
// ABOUTME: Reuses local images, pulls missing ones, builds recipes into session-tagged images

use crate::build_context::archive_directory;
use crate::config::{ImageRetention, SandboxConfig, Settings, SourceKind};
use crate::engine::{BuildRequest, ContainerEngine, EngineError};
use crate::error::ResolutionError;
use crate::report::{Reporter, SessionEvent};
use futures::StreamExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the image backing a session came to be available locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Already stored locally before the session started
    Reused,
    Pulled,
    Built,
}

/// The resolved, runnable image for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub image: String,
    pub origin: ImageOrigin,
    /// Whether teardown removes the image with the session
    pub owned: bool,
}

impl Environment {
    /// True when this session pulled or built the image
    pub fn created_by_session(&self) -> bool {
        self.origin != ImageOrigin::Reused
    }
}

pub struct EnvironmentResolver {
    engine: Arc<dyn ContainerEngine>,
    settings: Settings,
    reporter: Arc<dyn Reporter>,
}

impl EnvironmentResolver {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        settings: Settings,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            engine,
            settings,
            reporter,
        }
    }

    pub async fn resolve(&self, config: &SandboxConfig) -> Result<Environment, ResolutionError> {
        let reference = config.source_reference.trim();
        if reference.is_empty() {
            return Err(ResolutionError::MissingReference);
        }

        let owned = config.image_retention == ImageRetention::RemoveWithSession;
        match config.source_kind {
            SourceKind::RemoteImage => self.resolve_remote(reference, owned).await,
            SourceKind::LocalBuildRecipe => self.resolve_recipe(reference, config, owned).await,
        }
    }

    async fn resolve_remote(
        &self,
        reference: &str,
        owned: bool,
    ) -> Result<Environment, ResolutionError> {
        let present = image_exists(self.engine.as_ref(), reference)
            .await
            .map_err(ResolutionError::ListFailed)?;

        let origin = if present {
            info!("Image {} found locally", reference);
            self.reporter.report(SessionEvent::ImageFound {
                reference: reference.to_string(),
            });
            ImageOrigin::Reused
        } else {
            pull_image(self.engine.as_ref(), self.reporter.as_ref(), reference)
                .await
                .map_err(|source| ResolutionError::PullFailed {
                    reference: reference.to_string(),
                    source,
                })?;
            ImageOrigin::Pulled
        };

        Ok(Environment {
            image: reference.to_string(),
            origin,
            owned,
        })
    }

    async fn resolve_recipe(
        &self,
        recipe: &str,
        config: &SandboxConfig,
        owned: bool,
    ) -> Result<Environment, ResolutionError> {
        let (directory, file_name) = locate_recipe(&config.host_directory, recipe)?;

        let context =
            archive_directory(&directory).map_err(|source| ResolutionError::BuildContext {
                directory: directory.display().to_string(),
                source,
            })?;

        let tag = self.settings.resource_name(&config.working_directory);
        debug!(
            "Building {} from {} ({} byte context)",
            tag,
            recipe,
            context.len()
        );

        let request = BuildRequest {
            context,
            recipe_file: file_name,
            tag: tag.clone(),
        };

        // The whole response is read even after an error so the engine
        // finishes the build request cleanly.
        let mut failure = None;
        let mut output = self.engine.build_image(request);
        while let Some(event) = output.next().await {
            match event {
                Ok(event) => {
                    if let Some(error) = event.error {
                        warn!("Build error for {}: {}", tag, error);
                        failure.get_or_insert(error);
                    } else if let Some(line) = event.stream {
                        debug!("build: {}", line.trim_end());
                    }
                }
                Err(e) => {
                    warn!("Build stream error for {}: {}", tag, e);
                    failure.get_or_insert(e.to_string());
                }
            }
        }
        drop(output);

        if let Some(reason) = failure {
            return Err(ResolutionError::BuildFailed { tag, reason });
        }

        let os_type = match self.engine.image_os(&tag).await {
            Ok(os_type) => os_type,
            Err(e) => {
                debug!("Could not inspect built image {}: {}", tag, e);
                None
            }
        };

        info!("Built image {} from {}", tag, recipe);
        self.reporter.report(SessionEvent::ImageBuilt {
            tag: tag.clone(),
            recipe: recipe.to_string(),
            os_type,
        });

        Ok(Environment {
            image: tag,
            origin: ImageOrigin::Built,
            owned,
        })
    }
}

/// Find the recipe by exact file name in its directory listing
///
/// Returns the directory used as build context and the recipe file name
/// relative to it. No wildcard expansion is performed.
fn locate_recipe(host_directory: &Path, recipe: &str) -> Result<(PathBuf, String), ResolutionError> {
    let recipe_path = Path::new(recipe);
    let directory = match recipe_path.parent() {
        Some(parent) => host_directory.join(parent),
        None => host_directory.to_path_buf(),
    };

    let not_found = || ResolutionError::RecipeNotFound {
        recipe: recipe.to_string(),
        directory: directory.display().to_string(),
    };

    let file_name = recipe_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(not_found)?;

    let entries = fs::read_dir(&directory).map_err(|source| ResolutionError::ListingFailed {
        directory: directory.display().to_string(),
        source,
    })?;

    let found = entries.filter_map(|entry| entry.ok()).any(|entry| {
        entry.file_name().to_string_lossy() == file_name
            && entry.file_type().map(|t| !t.is_dir()).unwrap_or(false)
    });

    if found {
        Ok((directory, file_name))
    } else {
        Err(not_found())
    }
}

/// Whether any local image carries exactly this tag
pub(crate) async fn image_exists(
    engine: &dyn ContainerEngine,
    reference: &str,
) -> Result<bool, EngineError> {
    let images = engine.list_images().await?;
    Ok(images
        .iter()
        .any(|image| image.tags.iter().any(|tag| tag == reference)))
}

/// Pull an image to completion, forwarding byte progress to the reporter
pub(crate) async fn pull_image(
    engine: &dyn ContainerEngine,
    reporter: &dyn Reporter,
    reference: &str,
) -> Result<(), EngineError> {
    info!("Pulling image {}", reference);
    reporter.report(SessionEvent::PullStarted {
        reference: reference.to_string(),
    });

    let mut progress = engine.pull_image(reference);
    while let Some(event) = progress.next().await {
        let event = event?;
        match (event.current, event.total) {
            (Some(current), Some(total)) if total > 0 => {
                reporter.report(SessionEvent::PullProgress {
                    reference: reference.to_string(),
                    current,
                    total,
                });
            }
            _ => {
                if let Some(status) = event.status {
                    debug!("pull {}: {}", reference, status);
                }
            }
        }
    }

    reporter.report(SessionEvent::PullFinished {
        reference: reference.to_string(),
    });
    Ok(())
}
