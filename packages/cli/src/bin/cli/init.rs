// ABOUTME: `sndbx init` command
// ABOUTME: Turns operator flags into a session config and runs the sandbox on this terminal

use anyhow::{bail, Context, Result};
use clap::Args;
use sndbx_cli::env_file::parse_env_declarations;
use sndbx_cli::ports::parse_port;
use sndbx_cli::recipe::find_recipe;
use sndbx_cli::reporter::ConsoleReporter;
use sndbx_config::constants::SUGGESTED_ENVIRONMENTS;
use sndbx_sandbox::{
    CrosstermTerminal, DetachedTerminal, DockerEngine, ImageRetention, PortPair, Sandbox,
    SandboxConfig, SessionOutcome, Settings, TerminalMode,
};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Build the sandbox image from a local Dockerfile
    #[arg(short, long)]
    pub build: bool,

    /// Name of Dockerfile/Image
    #[arg(short, long)]
    pub context: Option<String>,

    /// Remove the sandbox after use
    #[arg(long, visible_alias = "rm")]
    pub remove: bool,

    /// Ports to expose (N or HOST:CONTAINER)
    #[arg(short, long, value_delimiter = ',', value_parser = parse_port)]
    pub ports: Vec<PortPair>,

    /// Containers to attach to the sandbox via network bridge
    #[arg(long, value_delimiter = ',')]
    pub plugins: Vec<String>,

    /// Environment variables: a KEY=VALUE file, or an inline list like A=1:B=2
    #[arg(short, long)]
    pub env: Option<String>,

    /// Keep the image when the sandbox is removed
    #[arg(long)]
    pub keep_image: bool,
}

pub async fn init_command(args: InitArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let settings = Settings::from_env();
    let config = build_config(&args, &cwd, &settings)?;
    println!("Current directory: {}", config.working_directory);
    debug!("Session config: {:?}", config);
    debug!("Naming settings: {:?}", settings);

    let engine = DockerEngine::connect()
        .await
        .context("Failed to create sandbox client")?;

    let terminal: Arc<dyn TerminalMode> = if std::io::stdin().is_terminal() {
        Arc::new(CrosstermTerminal)
    } else {
        info!("stdin is not a terminal, leaving line discipline unchanged");
        Arc::new(DetachedTerminal)
    };

    let sandbox = Sandbox::new(
        Arc::new(engine),
        settings,
        Arc::new(ConsoleReporter::new()),
        terminal,
    );

    let outcome = sandbox
        .run(&config, tokio::io::stdin(), tokio::io::stdout())
        .await?;

    if let SessionOutcome::Removed(report) = outcome {
        println!("✅ Sandbox removed ({} resource(s))", report.removed.len());
    }

    Ok(())
}

/// Resolve flags against the working directory into a session config
fn build_config(args: &InitArgs, cwd: &Path, settings: &Settings) -> Result<SandboxConfig> {
    let context = args
        .context
        .as_deref()
        .map(str::trim)
        .filter(|context| !context.is_empty());

    let config = if args.build {
        let recipe = match context {
            Some(recipe) => recipe.to_string(),
            None => find_recipe(cwd)
                .context("Cannot read current directory")?
                .context("dockerfile path is required in build mode")?,
        };
        println!("Proceeding with build mode using local Dockerfile: {}", recipe);
        SandboxConfig::local_recipe(recipe, cwd)
    } else {
        println!("Continuing with available built image");
        let Some(image) = context else {
            bail!(
                "docker image name is required, e.g. {}",
                SUGGESTED_ENVIRONMENTS.join(", ")
            );
        };
        println!("Proceeding using {} image", image);
        SandboxConfig::remote_image(image, cwd)
    };

    let plugins: Vec<String> = args
        .plugins
        .iter()
        .map(|plugin| plugin.trim())
        .filter(|plugin| !plugin.is_empty())
        .map(str::to_string)
        .collect();
    check_plugin_names(&plugins, &config, settings)?;

    let env = parse_env_declarations(args.env.as_deref().unwrap_or(""))?;

    let retention = if args.keep_image {
        ImageRetention::Keep
    } else {
        ImageRetention::RemoveWithSession
    };

    Ok(config
        .with_remove_after_use(args.remove)
        .with_ports(args.ports.clone())
        .with_plugins(plugins)
        .with_env(env)
        .with_image_retention(retention))
}

/// Reject plugins whose derived container names collide
///
/// Names come from the repository part of the reference only, so
/// `postgres:14` and `postgres:15` would both claim `<prefix>-postgres`.
fn check_plugin_names(
    plugins: &[String],
    config: &SandboxConfig,
    settings: &Settings,
) -> Result<()> {
    let primary = settings.resource_name(&config.working_directory);
    let mut seen: HashMap<String, &str> = HashMap::new();

    for plugin in plugins {
        let name = settings.plugin_name(plugin);
        if name == primary {
            bail!(
                "plugin {} would be named {}, which is the sandbox container's name",
                plugin,
                name
            );
        }
        if let Some(first) = seen.insert(name.clone(), plugin) {
            bail!(
                "plugins {} and {} would both be named {}; attach only one of them",
                first,
                plugin,
                name
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sndbx_sandbox::SourceKind;
    use tempfile::TempDir;

    #[test]
    fn test_build_mode_discovers_dockerfile() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        let args = InitArgs {
            build: true,
            ..Default::default()
        };

        let config = build_config(&args, dir.path(), &Settings::default()).unwrap();

        assert_eq!(config.source_kind, SourceKind::LocalBuildRecipe);
        assert_eq!(config.source_reference, "Dockerfile");
    }

    #[test]
    fn test_build_mode_without_recipe_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile.dev"), "FROM alpine\n").unwrap();
        let args = InitArgs {
            build: true,
            ..Default::default()
        };

        let err = build_config(&args, dir.path(), &Settings::default()).unwrap_err();

        assert_eq!(err.to_string(), "dockerfile path is required in build mode");
    }

    #[test]
    fn test_image_mode_requires_image() {
        let dir = TempDir::new().unwrap();

        let err =
            build_config(&InitArgs::default(), dir.path(), &Settings::default()).unwrap_err();

        assert!(err.to_string().contains("alpine:latest"));
    }

    #[test]
    fn test_flags_carry_into_config() {
        let dir = TempDir::new().unwrap();
        let args = InitArgs {
            context: Some("alpine:latest".to_string()),
            remove: true,
            ports: vec![PortPair::same(8080)],
            plugins: vec!["".to_string(), "postgres:latest".to_string()],
            env: Some("A=1:B=2".to_string()),
            keep_image: true,
            ..Default::default()
        };

        let config = build_config(&args, dir.path(), &Settings::default()).unwrap();

        assert_eq!(config.source_kind, SourceKind::RemoteImage);
        assert!(config.remove_after_use);
        assert_eq!(config.ports, vec![PortPair::same(8080)]);
        assert_eq!(config.plugins, vec!["postgres:latest".to_string()]);
        assert_eq!(config.env, vec!["A=1".to_string(), "B=2".to_string()]);
        assert_eq!(config.image_retention, ImageRetention::Keep);
    }

    #[test]
    fn test_plugins_with_same_repository_are_rejected() {
        let dir = TempDir::new().unwrap();
        let args = InitArgs {
            context: Some("alpine:latest".to_string()),
            plugins: vec!["postgres:14".to_string(), "postgres:15".to_string()],
            ..Default::default()
        };

        let err = build_config(&args, dir.path(), &Settings::default()).unwrap_err();

        assert_eq!(
            err.to_string(),
            "plugins postgres:14 and postgres:15 would both be named sndbx-postgres; attach only one of them"
        );
    }

    #[test]
    fn test_plugin_named_like_sandbox_is_rejected() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("redis");
        std::fs::create_dir(&dir).unwrap();
        let args = InitArgs {
            context: Some("alpine:latest".to_string()),
            plugins: vec!["bitnami/redis:7".to_string()],
            ..Default::default()
        };

        let err = build_config(&args, &dir, &Settings::default()).unwrap_err();

        assert!(err.to_string().contains("sndbx-redis"));
    }

    #[test]
    fn test_distinct_plugins_are_accepted() {
        let dir = TempDir::new().unwrap();
        let args = InitArgs {
            context: Some("alpine:latest".to_string()),
            plugins: vec!["postgres:15".to_string(), "redis:7".to_string()],
            ..Default::default()
        };

        let config = build_config(&args, dir.path(), &Settings::default()).unwrap();

        assert_eq!(config.plugins.len(), 2);
    }
}
