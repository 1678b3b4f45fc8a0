use crate::error::Error;
use crate::registry::{Category, CategoryPaths, Registry};
use crate::transform::script::EsTarget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the optional project configuration file.
pub const CONFIG_FILE: &str = "assetline.json";

/// Runtime configuration for the assetline CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory (the project root).
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// Project settings read from `assetline.json`.
///
/// Every field is optional; an absent file means all defaults.
///
/// ```json
/// {
///   "server": { "port": 8080, "tunnel": true },
///   "paths": { "scripts": { "src": ["src/js/**/*.js"], "dist": "public/js" } },
///   "scripts": { "target": "es2017" },
///   "images": { "jpegQuality": 70 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub server: ServerConfig,
    /// Per-category overrides of the default registry.
    pub paths: BTreeMap<Category, CategoryPaths>,
    pub scripts: ScriptsConfig,
    pub images: ImagesConfig,
}

/// Dev server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served, relative to the project root.
    pub root: String,
    /// Expose the server through a public relay.
    pub tunnel: bool,
    /// Relay host used when `tunnel` is on.
    pub tunnel_host: String,
    /// Show an in-page banner on connect and reload.
    pub notify: bool,
    /// Open a browser once the server is up.
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            root: "dist".to_string(),
            tunnel: false,
            tunnel_host: "https://localtunnel.me".to_string(),
            notify: true,
            open: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsConfig {
    /// Language level scripts are emitted at.
    pub target: EsTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ImagesConfig {
    /// JPEG re-encode quality, clamped to 70..=80.
    pub jpeg_quality: u8,
    /// Use zopfli for PNG recompression (slower, smaller).
    pub zopfli: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 75,
            zopfli: true,
        }
    }
}

impl ProjectConfig {
    /// Load `assetline.json` from the project root, or defaults if it is absent.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_file(&path)
    }

    /// Load a specific config file.
    pub fn load_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The default registry with this config's overrides applied.
    #[must_use]
    pub fn registry(&self) -> Registry {
        self.paths
            .iter()
            .fold(Registry::default(), |registry, (category, paths)| {
                registry.with(*category, paths.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempdir().unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.server.port, 3000);
        assert!(config.server.notify);
        assert!(!config.server.tunnel);
    }

    #[test]
    fn test_partial_config_overrides() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "server": { "port": 8080, "tunnel": true },
                "paths": { "scripts": { "src": ["app/**/*.js"], "dist": "public/js" } },
                "scripts": { "target": "es2017" },
                "images": { "jpegQuality": 70 }
            }"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.server.tunnel);
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.scripts.target, EsTarget::ES2017);
        assert_eq!(config.images.jpeg_quality, 70);
        assert!(config.images.zopfli);

        let registry = config.registry();
        assert_eq!(registry.get(Category::Scripts).dist, "public/js");
        assert!(registry.get(Category::Scripts).watch.is_empty());
        assert_eq!(registry.get(Category::Styles).dist, "dist/styles");
    }

    #[test]
    fn test_unknown_category_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "paths": { "videos": { "src": ["a"], "dist": "b" } } }"#,
        )
        .unwrap();

        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_runtime_config_builders() {
        let config = Config::new(PathBuf::from("/tmp/site"))
            .with_verbosity(2)
            .with_json_logs(true);
        assert_eq!(config.verbosity, 2);
        assert!(config.json_logs);
        assert_eq!(config.cwd, PathBuf::from("/tmp/site"));
    }
}
