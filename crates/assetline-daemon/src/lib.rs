#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! Long-running side of assetline.
//!
//! The daemon provides:
//! - Task runs off the async reactor, with logging and reload signalling
//! - A per-category file watcher
//! - A static dev server with live reload and an optional public tunnel
//! - The orchestrator tying them together

pub mod orchestrator;
pub mod reload;
pub mod runner;
pub mod server;
pub mod tunnel;
pub mod watch;

pub use orchestrator::{Orchestrator, OrchestratorError};
pub use reload::{ReloadEvent, ReloadHub};
pub use runner::run_category;
pub use server::{DevServer, ServerError};
pub use tunnel::{open_tunnel, Tunnel, TunnelError};
pub use watch::{WatchError, Watcher};
