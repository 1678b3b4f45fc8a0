#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod registry;
pub mod task;
pub mod transform;
pub mod version;

pub use config::{Config, ProjectConfig, ServerConfig};
pub use error::{Error, TransformError};
pub use registry::{Category, CategoryPaths, CompiledCategory, CompiledRegistry, Registry, ReloadKind};
pub use task::{FileOutcome, SkipReason, TaskReport, TransformTask};
pub use version::VERSION;
