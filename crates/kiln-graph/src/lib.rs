//! # kiln-graph
//!
//! Live dependency graph of served URLs and the hot module replacement (HMR)
//! engine built on top of it.
//!
//! ## Overview
//!
//! Every module the dev server hands to a browser becomes a node keyed by its
//! served URL. When the server rewrites the imports of a module it records the
//! resulting edges with [`DependencyGraph::set_entry`]. When a file changes,
//! [`DependencyGraph::bubble`] walks the dependents of its URL until it finds a
//! module that accepts hot updates, or reaches the top of the graph and asks
//! for a full page reload.
//!
//! [`HmrEngine`] owns one graph per server instance, batches the resulting
//! [`HmrMessage`]s behind a debounce window, and fans them out to every
//! connected client.
//!
//! ```rust
//! use kiln_graph::{DependencyGraph, HmrMessage};
//!
//! let mut graph = DependencyGraph::new();
//! graph.set_entry("/src/app.js", ["/src/button.js"], false);
//! graph.set_entry("/src/button.js", Vec::<String>::new(), true);
//! graph.accept("/src/button.js");
//!
//! let messages = graph.bubble("/src/button.js");
//! assert_eq!(messages, vec![HmrMessage::update("/src/button.js")]);
//! ```

mod engine;
mod graph;
mod message;

pub use engine::{DEFAULT_DEBOUNCE, HmrEngine};
pub use graph::{DependencyGraph, DependencyNode};
pub use message::{ClientMessage, HmrMessage, collapse_batch};
