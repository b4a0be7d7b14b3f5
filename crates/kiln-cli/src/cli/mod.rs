//! Command-line interface definition for kiln.
//!
//! - `kiln dev` - serve the project with on-demand builds and HMR
//! - `kiln build` - build every mounted file once and write it to disk

mod commands;
mod tests;

use clap::Parser;

pub use commands::{BuildArgs, Command, DevArgs};

/// kiln - an unbundled dev server for ES modules
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "An unbundled dev server for ES modules",
    long_about = "kiln serves every source file as its own ES module, built on request\n\
                  through a plugin pipeline and cached across restarts. Changes are\n\
                  pushed to the browser over a WebSocket as hot module updates."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
