//! kiln CLI - an unbundled dev server for ES modules.
//!
//! - [`cli`] - argument parsing
//! - [`commands`] - `kiln dev` and `kiln build`
//! - [`dev`] - HTTP server, HMR WebSocket and file watcher
//! - [`project`] - turning configuration into a build orchestrator
//! - [`error`] - CLI error type and miette reporting
//! - [`logger`] - `tracing` subscriber setup
//! - [`ui`] - terminal output
//!
//! ```rust
//! use kiln_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod project;
pub mod ui;

pub use error::{CliError, Result, ResultExt};
