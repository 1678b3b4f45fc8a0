use crate::transform::{
    css::CssError, image::ImageError, include::IncludeError, sass::SassError,
    script::CompilerError,
};
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for assetline operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid glob `{pattern}` in {category}: {source}")]
    Glob {
        category: &'static str,
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Failure of a single file inside a transform task.
///
/// These never abort the task; they are collected into its report.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Include(#[from] IncludeError),

    #[error(transparent)]
    Sass(#[from] SassError),

    #[error(transparent)]
    Css(#[from] CssError),

    #[error(transparent)]
    Script(#[from] CompilerError),

    #[error(transparent)]
    Image(#[from] ImageError),
}
