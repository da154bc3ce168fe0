// ABOUTME: Console rendering of session progress for the operator
// ABOUTME: Emoji status lines, a pull progress bar and manual cleanup hints

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use sndbx_sandbox::{Reporter, SessionEvent, SessionResources, TeardownStep};
use std::sync::Mutex;

/// Prints session progress to stdout
#[derive(Default)]
pub struct ConsoleReporter {
    pull_bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_pull_bar(&self, current: i64, total: i64) {
        let total = total.max(1);
        let mut slot = self.pull_bar.lock().unwrap_or_else(|e| e.into_inner());
        let bar = slot.get_or_insert_with(|| {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {msg}") {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        });

        // Each layer reports its own total; the bar follows the latest one
        bar.set_length(total as u64);
        bar.set_position(current.clamp(0, total) as u64);
        bar.set_message(format!("{:.2}%", percentage(current, total)));
    }

    fn finish_pull_bar(&self) {
        let bar = self
            .pull_bar
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(bar) = bar {
            bar.finish();
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: SessionEvent) {
        match event {
            SessionEvent::ImageFound { reference } => {
                println!("✅ Using local image {}", reference);
            }
            SessionEvent::PullStarted { reference } => {
                println!("⬇️  Pulling image {}", reference);
            }
            SessionEvent::PullProgress { current, total, .. } => {
                self.update_pull_bar(current, total);
            }
            SessionEvent::PullFinished { reference } => {
                self.finish_pull_bar();
                println!("✅ Image pull complete");
                println!("Pulled Image {}", reference);
            }
            SessionEvent::ImageBuilt {
                tag,
                recipe,
                os_type,
            } => {
                println!(
                    "🏗️  Created Image {} ({}) using local {}",
                    tag,
                    os_type.as_deref().unwrap_or("unknown os"),
                    recipe
                );
            }
            SessionEvent::NetworkCreated { name, id } => {
                println!("🌐 Network {} created ({})", name, id);
            }
            SessionEvent::PluginCreated {
                reference,
                container_id,
            } => {
                println!(
                    "📦 Plugin Sidecar Container {} created for {}",
                    container_id, reference
                );
            }
            SessionEvent::PluginStarted { container_id, .. }
            | SessionEvent::ContainerStarted { id: container_id } => {
                println!("▶️  Container {} started", container_id);
            }
            SessionEvent::PluginReachable {
                reference,
                name,
                network,
            } => {
                println!(
                    "🔌 {} reachable as {} on network {}",
                    reference,
                    name.bold(),
                    network
                );
            }
            SessionEvent::ContainerCreated { id } => {
                println!("📦 Container {} created", id);
            }
            SessionEvent::Removed { step, resource } => {
                println!("🗑️  {} {} removed", step_label(step), resource);
            }
            SessionEvent::RollingBack { reason } => {
                eprintln!("{} {}", "Rolling back:".yellow().bold(), reason);
            }
            SessionEvent::LeftRunning(resources) => {
                println!("{}", "Sandbox left running. To remove it, run:".bold());
                for hint in handoff_hints(&resources) {
                    println!("  {}", hint);
                }
            }
        }
    }
}

fn percentage(current: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (current.clamp(0, total) as f64 / total as f64) * 100.0
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Commands that remove what a left-running session holds, in teardown order
pub fn handoff_hints(resources: &SessionResources) -> Vec<String> {
    let mut hints = Vec::new();

    if let Some(id) = &resources.primary {
        hints.push(format!("docker rm -f {}", id));
    }
    if let Some(image) = &resources.image {
        hints.push(format!("docker rmi {}", image));
    }
    for plugin in &resources.plugins {
        hints.push(format!("docker rm -f {}", plugin.container_id));
    }
    if let Some(id) = &resources.network {
        hints.push(format!("docker network rm {}", id));
    }

    hints
}

/// Label used when summarizing removals
pub fn step_label(step: TeardownStep) -> String {
    capitalize(&step.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sndbx_sandbox::Plugin;

    #[test]
    fn test_handoff_hints_follow_teardown_order() {
        let resources = SessionResources {
            primary: Some("abc123".to_string()),
            image: Some("sndbx-myapp".to_string()),
            plugins: vec![Plugin {
                reference: "postgres:latest".to_string(),
                name: "sndbx-postgres".to_string(),
                container_id: "def456".to_string(),
            }],
            network: Some("net789".to_string()),
        };

        assert_eq!(
            handoff_hints(&resources),
            vec![
                "docker rm -f abc123",
                "docker rmi sndbx-myapp",
                "docker rm -f def456",
                "docker network rm net789",
            ]
        );
    }

    #[test]
    fn test_handoff_hints_skip_absent_resources() {
        let resources = SessionResources {
            primary: Some("abc123".to_string()),
            ..Default::default()
        };

        assert_eq!(handoff_hints(&resources), vec!["docker rm -f abc123"]);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(format!("{:.2}", percentage(1, 3)), "33.33");
        assert_eq!(percentage(5, 0), 0.0);
        assert_eq!(percentage(150, 100), 100.0);
    }

    #[test]
    fn test_step_label() {
        assert_eq!(step_label(TeardownStep::PrimaryContainer), "Primary container");
        assert_eq!(step_label(TeardownStep::Container), "Container");
        assert_eq!(step_label(TeardownStep::Plugin), "Plugin container");
    }
}
