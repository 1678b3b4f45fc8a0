//! Default pipeline: build once, then watch and serve.

use assetline_core::{Config, ProjectConfig};
use miette::{IntoDiagnostic, Result};
use tracing::info;

/// Server overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct DevAction {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub tunnel: bool,
    pub open: bool,
}

impl DevAction {
    /// Apply the overrides on top of the project's server settings.
    fn apply(self, project: &mut ProjectConfig) {
        if let Some(port) = self.port {
            project.server.port = port;
        }
        if let Some(host) = self.host {
            project.server.host = host;
        }
        project.server.tunnel |= self.tunnel;
        project.server.open |= self.open;
    }
}

pub fn run(config: &Config, action: DevAction) -> Result<()> {
    let mut project = ProjectConfig::load(&config.cwd).into_diagnostic()?;
    action.apply(&mut project);
    let orchestrator = super::orchestrator(config, Some(project))?;

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(async {
        tokio::select! {
            result = orchestrator.run() => result.into_diagnostic(),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                Ok(())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_project() {
        let mut project = ProjectConfig::default();
        project.server.tunnel = true;

        DevAction {
            port: Some(8080),
            host: None,
            tunnel: false,
            open: true,
        }
        .apply(&mut project);

        assert_eq!(project.server.port, 8080);
        assert_eq!(project.server.host, "localhost");
        assert!(project.server.tunnel);
        assert!(project.server.open);
    }
}
