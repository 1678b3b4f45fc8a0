//! Sass/SCSS compilation using grass.
//!
//! The input syntax follows the file extension: `.sass` is the indented
//! syntax, `.css` is plain CSS, everything else is SCSS.

use grass::InputSyntax;
use std::path::Path;

/// Sass compilation options.
#[derive(Debug, Clone, Default)]
pub struct SassOptions {
    /// Extra load paths for `@import`/`@use` resolution.
    pub include_paths: Vec<String>,
    /// Source file path; its directory is added as a load path.
    pub filename: Option<String>,
}

/// Compile Sass, SCSS or CSS source to expanded CSS.
pub fn compile_sass(source: &str, options: &SassOptions) -> Result<String, SassError> {
    let filename = options.filename.as_deref().unwrap_or("input.scss");

    let mut grass_options = grass::Options::default()
        .style(grass::OutputStyle::Expanded)
        .input_syntax(input_syntax(Path::new(filename)));

    for path in &options.include_paths {
        grass_options = grass_options.load_path(path);
    }
    if let Some(parent) = Path::new(filename).parent() {
        grass_options = grass_options.load_path(parent);
    }

    grass::from_string(source.to_string(), &grass_options)
        .map_err(|e| SassError::Compile(format!("{filename}: {e}")))
}

/// Whether `path` is an import-only partial (`_name.scss`).
#[must_use]
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

fn input_syntax(path: &Path) -> InputSyntax {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("sass") => InputSyntax::Sass,
        Some(ext) if ext.eq_ignore_ascii_case("css") => InputSyntax::Css,
        _ => InputSyntax::Scss,
    }
}

/// Sass compilation error.
#[derive(Debug)]
pub enum SassError {
    /// Compilation error.
    Compile(String),
}

impl std::fmt::Display for SassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SassError::Compile(msg) => write!(f, "Sass compile error: {msg}"),
        }
    }
}

impl std::error::Error for SassError {}
