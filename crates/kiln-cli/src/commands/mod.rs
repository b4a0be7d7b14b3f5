//! Command implementations for the kiln CLI.
//!
//! - [`dev`] - development server with hot module replacement
//! - [`build`] - one-shot build of every mounted file
//!
//! Each command exposes an `execute` function taking its parsed arguments.

pub mod build;
pub mod dev;

pub use build::execute as build_execute;
pub use dev::execute as dev_execute;
