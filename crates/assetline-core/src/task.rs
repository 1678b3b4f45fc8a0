//! Transform tasks: one run of a category over its current source files.
//!
//! A run never stops at a bad file. Each source gets its own [`FileOutcome`]
//! and the caller decides how to surface failures.

use crate::config::ProjectConfig;
use crate::error::TransformError;
use crate::registry::{Category, CompiledCategory, SourceFile};
use crate::transform::{
    css::{process_css, CssOptions},
    html::build_html,
    image::{optimize_image, ImageKind, ImageSettings},
    sass::{compile_sass, is_partial, SassOptions},
    script::ScriptCompiler,
};
use assetline_util::fs::{atomic_write, is_newer, read_to_string_lossy, write_if_changed};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

/// Directory under the styles output that holds source maps.
pub const STYLE_MAPS_DIR: &str = "maps";

/// Settings shared by every task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskOptions {
    pub scripts: ScriptCompiler,
    pub images: ImageSettings,
}

impl TaskOptions {
    #[must_use]
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            scripts: ScriptCompiler::new(config.scripts.target),
            images: ImageSettings::new(config.images.jpeg_quality, config.images.zopfli),
        }
    }
}

/// Why a source produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Import-only Sass partial.
    Partial,
    /// Output is at least as new as the source.
    UpToDate,
}

/// Result of transforming one source file.
#[derive(Debug)]
pub enum FileOutcome {
    /// Outputs were (re)written.
    Written(Vec<PathBuf>),
    /// Outputs already held the transformed bytes.
    Unchanged(Vec<PathBuf>),
    Skipped(SkipReason),
    Failed(TransformError),
}

#[derive(Debug)]
pub struct FileReport {
    pub source: PathBuf,
    pub outcome: FileOutcome,
}

/// Everything one task run did.
#[derive(Debug)]
pub struct TaskReport {
    pub category: Category,
    pub files: Vec<FileReport>,
    pub duration: Duration,
}

impl TaskReport {
    /// Output files emitted by this run, written or already current.
    #[must_use]
    pub fn items(&self) -> usize {
        self.files
            .iter()
            .map(|f| match &f.outcome {
                FileOutcome::Written(outputs) | FileOutcome::Unchanged(outputs) => outputs.len(),
                FileOutcome::Skipped(_) | FileOutcome::Failed(_) => 0,
            })
            .sum()
    }

    /// Number of sources whose outputs changed on disk.
    #[must_use]
    pub fn written(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Written(_)))
            .count()
    }

    /// Sources that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&Path, &TransformError)> {
        self.files.iter().filter_map(|f| match &f.outcome {
            FileOutcome::Failed(error) => Some((f.source.as_path(), error)),
            _ => None,
        })
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// The transform chain of one category bound to its compiled paths.
#[derive(Debug, Clone)]
pub struct TransformTask {
    paths: CompiledCategory,
    options: TaskOptions,
}

impl TransformTask {
    #[must_use]
    pub fn new(paths: CompiledCategory, options: TaskOptions) -> Self {
        Self { paths, options }
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.paths.category()
    }

    #[must_use]
    pub fn paths(&self) -> &CompiledCategory {
        &self.paths
    }

    /// Transform every file currently matching the category's sources.
    ///
    /// Missing source directories produce an empty report.
    #[must_use]
    pub fn run(&self) -> TaskReport {
        let started = Instant::now();
        let files = self
            .paths
            .collect_sources()
            .into_iter()
            .map(|source| {
                let outcome = self.run_file(&source).unwrap_or_else(FileOutcome::Failed);
                FileReport {
                    source: source.path,
                    outcome,
                }
            })
            .collect();

        TaskReport {
            category: self.category(),
            files,
            duration: started.elapsed(),
        }
    }

    fn run_file(&self, source: &SourceFile) -> Result<FileOutcome, TransformError> {
        match self.category() {
            Category::ServerConfig | Category::Fonts => self.copy(source),
            Category::Html => self.html(source),
            Category::Styles => self.style(source),
            Category::Scripts => self.script(source),
            Category::Images => self.image(source),
        }
    }

    fn copy(&self, source: &SourceFile) -> Result<FileOutcome, TransformError> {
        let bytes = read_bytes(&source.path)?;
        write_outputs(vec![(self.paths.output_path(&source.relative), bytes)])
    }

    fn html(&self, source: &SourceFile) -> Result<FileOutcome, TransformError> {
        let html = build_html(&source.path)?;
        write_outputs(vec![(
            self.paths.output_path(&source.relative),
            html.into_bytes(),
        )])
    }

    fn style(&self, source: &SourceFile) -> Result<FileOutcome, TransformError> {
        if is_partial(&source.path) {
            return Ok(FileOutcome::Skipped(SkipReason::Partial));
        }

        let text = read_text(&source.path)?;
        let compiled = compile_sass(
            &text,
            &SassOptions {
                include_paths: vec![],
                filename: Some(source.path.display().to_string()),
            },
        )?;

        let result = process_css(
            &compiled,
            &CssOptions {
                minify: true,
                autoprefixer: true,
                source_map: true,
                // The map describes the compiled CSS, not the Sass source.
                filename: Some(url_path(&source.relative.with_extension("css"))),
                targets: None,
            },
        )?;

        let min_rel = source.relative.with_extension("min.css");
        let map_rel = PathBuf::from(STYLE_MAPS_DIR).join(with_suffix(&min_rel, ".map"));
        let depth = min_rel.components().count().saturating_sub(1);

        let mut code = result.code;
        let mut outputs = Vec::with_capacity(2);
        if let Some(map) = result.map {
            code.push_str(&format!(
                "\n/*# sourceMappingURL={}{} */",
                "../".repeat(depth),
                url_path(&map_rel)
            ));
            outputs.push((self.paths.output_path(&map_rel), map.into_bytes()));
        }
        outputs.insert(0, (self.paths.output_path(&min_rel), code.into_bytes()));

        write_outputs(outputs)
    }

    fn script(&self, source: &SourceFile) -> Result<FileOutcome, TransformError> {
        let text = read_text(&source.path)?;
        let output = self
            .options
            .scripts
            .compile(&url_path(&source.relative), &text)?;

        let min_rel = source.relative.with_extension("min.js");
        let map_rel = with_suffix(&min_rel, ".map");

        let mut code = output.code;
        let mut outputs = Vec::with_capacity(2);
        if let Some(map) = output.map {
            let map_name = map_rel
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            code.push_str(&format!("\n//# sourceMappingURL={map_name}"));
            outputs.push((self.paths.output_path(&map_rel), map.into_bytes()));
        }
        outputs.insert(0, (self.paths.output_path(&min_rel), code.into_bytes()));

        write_outputs(outputs)
    }

    fn image(&self, source: &SourceFile) -> Result<FileOutcome, TransformError> {
        let dest = self.paths.output_path(&source.relative);
        let newer = is_newer(&source.path, &dest).map_err(|e| TransformError::Read {
            path: source.path.clone(),
            source: e,
        })?;
        if !newer {
            return Ok(FileOutcome::Skipped(SkipReason::UpToDate));
        }

        let bytes = read_bytes(&source.path)?;
        let optimized = match ImageKind::from_path(&source.path) {
            Some(kind) => optimize_image(kind, &bytes, &self.options.images)?,
            None => bytes,
        };

        atomic_write(&dest, &optimized).map_err(|e| TransformError::Write {
            path: dest.clone(),
            source: e,
        })?;
        Ok(FileOutcome::Written(vec![dest]))
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, TransformError> {
    std::fs::read(path).map_err(|e| TransformError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_text(path: &Path) -> Result<String, TransformError> {
    read_to_string_lossy(path).map_err(|e| TransformError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_outputs(outputs: Vec<(PathBuf, Vec<u8>)>) -> Result<FileOutcome, TransformError> {
    let mut changed = false;
    let mut paths = Vec::with_capacity(outputs.len());
    for (path, bytes) in outputs {
        changed |= write_if_changed(&path, &bytes).map_err(|e| TransformError::Write {
            path: path.clone(),
            source: e,
        })?;
        paths.push(path);
    }

    Ok(if changed {
        FileOutcome::Written(paths)
    } else {
        FileOutcome::Unchanged(paths)
    })
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// `/`-separated form of a relative path.
fn url_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
