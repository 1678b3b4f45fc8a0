use assetline_core::Config;
use miette::{IntoDiagnostic, Result};
use tracing::info;

/// Watch sources and re-run matching categories. No initial build, no server.
pub fn run(config: &Config) -> Result<()> {
    let orchestrator = super::orchestrator(config, None)?;

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(async {
        tokio::select! {
            result = orchestrator.watch() => result.into_diagnostic(),
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watcher");
                Ok(())
            }
        }
    })
}
