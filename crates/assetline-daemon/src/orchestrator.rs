//! Top-level pipeline: build every category once, then watch and serve.

use crate::reload::{ReloadHub, RELOAD_CHANNEL_CAPACITY};
use crate::runner::run_category;
use crate::server::{open_browser, DevServer, ServerError};
use crate::tunnel::{open_tunnel, TunnelError};
use crate::watch::{WatchError, Watcher};
use assetline_core::task::TaskOptions;
use assetline_core::{ProjectConfig, ServerConfig, TaskReport, TransformTask};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Owns the compiled tasks, the reload channel, the watcher and the dev server.
#[derive(Debug)]
pub struct Orchestrator {
    root: PathBuf,
    config: ProjectConfig,
    tasks: Vec<Arc<TransformTask>>,
    hub: ReloadHub,
}

impl Orchestrator {
    /// Compile the project's registry rooted at `root`.
    pub fn new(root: &Path, config: ProjectConfig) -> Result<Self, OrchestratorError> {
        let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let compiled = config.registry().compile(&root)?;
        let options = TaskOptions::from_config(&config);
        let tasks = compiled
            .iter()
            .map(|paths| Arc::new(TransformTask::new(paths.clone(), options)))
            .collect();

        Ok(Self {
            root,
            config,
            tasks,
            hub: ReloadHub::new(RELOAD_CHANNEL_CAPACITY),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reload channel shared by the task runners and the dev server.
    #[must_use]
    pub fn hub(&self) -> &ReloadHub {
        &self.hub
    }

    /// Run every category once, concurrently.
    ///
    /// Failures are logged and returned in the reports; they never stop the
    /// other categories.
    pub async fn build_all(&self) -> Vec<TaskReport> {
        let runs = self
            .tasks
            .iter()
            .map(|task| run_category(task.clone(), &self.hub));

        let mut reports = Vec::with_capacity(self.tasks.len());
        for (task, result) in self.tasks.iter().zip(join_all(runs).await) {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!(category = %task.category(), error = %e, "Task panicked"),
            }
        }

        let failed: usize = reports.iter().map(|r| r.failures().count()).sum();
        if failed > 0 {
            warn!(failed, "Initial build finished with failures");
        } else {
            info!("Initial build finished");
        }
        reports
    }

    /// Watcher over this project's watched categories.
    #[must_use]
    pub fn watcher(&self) -> Watcher {
        Watcher::new(&self.root, self.tasks.clone(), self.hub.clone())
    }

    /// Watch without serving. Runs until the process ends.
    pub async fn watch(&self) -> Result<(), OrchestratorError> {
        self.watcher().run().await?;
        Ok(())
    }

    /// Start the dev server (and tunnel, if enabled) and the watcher.
    ///
    /// A server or tunnel that fails to start is returned as an error
    /// before anything is watched.
    pub async fn watch_and_serve(&self, server: &ServerConfig) -> Result<(), OrchestratorError> {
        let listener = DevServer::bind(&server.host, server.port).await?;
        let port = listener
            .local_addr()
            .map_err(|e| ServerError::Serve(e.to_string()))?
            .port();
        let url = format!("http://{}:{port}", server.host);
        let serve_root = self.root.join(&server.root);
        info!(url = %url, root = %serve_root.display(), "Dev server listening");

        let tunnel = if server.tunnel {
            let tunnel = open_tunnel(&server.tunnel_host, &server.host, port).await?;
            info!(url = %tunnel.url(), "Public URL");
            Some(tunnel)
        } else {
            None
        };

        if server.open {
            if let Err(e) = open_browser(&url) {
                warn!(error = %e, "Failed to open browser");
            }
        }

        let dev = DevServer::new(&serve_root, self.hub.clone(), server.notify);
        let watcher = self.watcher();
        let result = tokio::try_join!(
            async { watcher.run().await.map_err(OrchestratorError::from) },
            async { dev.serve(listener).await.map_err(OrchestratorError::from) },
        );

        drop(tunnel);
        result.map(|_| ())
    }

    /// Build once, then watch and serve with the project's server settings.
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        self.build_all().await;
        self.watch_and_serve(&self.config.server).await
    }
}

/// Orchestrator error.
#[derive(Debug)]
pub enum OrchestratorError {
    Config(assetline_core::Error),
    Watch(WatchError),
    Server(ServerError),
    Tunnel(TunnelError),
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Watch(e) => write!(f, "{e}"),
            Self::Server(e) => write!(f, "{e}"),
            Self::Tunnel(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Watch(e) => Some(e),
            Self::Server(e) => Some(e),
            Self::Tunnel(e) => Some(e),
        }
    }
}

impl From<assetline_core::Error> for OrchestratorError {
    fn from(e: assetline_core::Error) -> Self {
        Self::Config(e)
    }
}

impl From<WatchError> for OrchestratorError {
    fn from(e: WatchError) -> Self {
        Self::Watch(e)
    }
}

impl From<ServerError> for OrchestratorError {
    fn from(e: ServerError) -> Self {
        Self::Server(e)
    }
}

impl From<TunnelError> for OrchestratorError {
    fn from(e: TunnelError) -> Self {
        Self::Tunnel(e)
    }
}
