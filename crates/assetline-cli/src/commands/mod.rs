pub mod build;
pub mod dev;
pub mod version;
pub mod watch;

use assetline_core::{Config, ProjectConfig};
use assetline_daemon::Orchestrator;
use miette::{IntoDiagnostic, Result};

/// Load the project config under `config.cwd` and compile its tasks.
fn orchestrator(config: &Config, project: Option<ProjectConfig>) -> Result<Orchestrator> {
    let project = match project {
        Some(project) => project,
        None => ProjectConfig::load(&config.cwd).into_diagnostic()?,
    };
    Orchestrator::new(&config.cwd, project).into_diagnostic()
}
