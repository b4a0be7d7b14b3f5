//! Development server.
//!
//! - on-demand builds over HTTP with `ETag` revalidation
//! - HMR WebSocket backed by [`kiln_graph::HmrEngine`]
//! - file watching with debouncing

pub mod server;
pub mod watcher;

pub use server::DevServer;
pub use watcher::{FileWatcher, should_ignore};
