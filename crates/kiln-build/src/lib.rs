//! # kiln-build
//!
//! Unbundled, request-time builds for the kiln dev server.
//!
//! Every source file is built on its own when the browser first asks for one of
//! its URLs:
//!
//! 1. [`MountTable`] maps the URL back to a source file and output extension.
//! 2. [`PluginPipeline`] loads the file through the first plugin that accepts
//!    its extension, then runs every transform plugin over each output.
//! 3. [`ImportResolver`] rewrites the import specifiers of script output into
//!    URLs, turning non-script imports into `.proxy.js` modules.
//! 4. [`BuildOrchestrator`] ties it together: it deduplicates concurrent builds,
//!    keeps finished builds in memory and in a persistent [`CacheStore`], and
//!    records import edges in the [`kiln_graph::HmrEngine`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use kiln_build::{BuildOrchestrator, CacheStore};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(CacheStore::open(".kiln/cache".as_ref())?);
//! let orchestrator = BuildOrchestrator::builder("/path/to/project")
//!     .mount("public", "/")
//!     .mount("src", "/_dist_")
//!     .cache_store(store)
//!     .build()?;
//!
//! let response = orchestrator.serve("/_dist_/index.js").await?;
//! println!("{} bytes of {}", response.body.len(), response.content_type);
//! # Ok(()) }
//! ```

pub mod build_map;
pub mod cache;
pub mod error;
pub mod imports;
pub mod mount;
pub mod orchestrator;
pub mod pipeline;
pub mod plugin;
pub mod proxy;
pub mod resolver;

pub use build_map::{BuildMap, BuildOutput, SCRIPT_EXTENSIONS, file_extension, is_script_extension};
pub use cache::{CacheEntry, CacheStore, content_hash};
pub use error::{BuildError, CacheError, PipelineError};
pub use mount::{Mount, MountTable, RequestTarget};
pub use orchestrator::{BuildOrchestrator, BuildOrchestratorBuilder, FileChange, ServedResponse};
pub use pipeline::{ExtensionMap, FailurePolicy, PluginPipeline};
pub use plugin::{
    LoadContext, LoadOutput, Plugin, PluginError, ResolveSpec, SharedPlugin, TransformContext,
    TransformOutput,
};
pub use proxy::HMR_CLIENT_URL;
pub use resolver::{
    ImportMap, ImportMapResolver, ImportResolver, PROXY_MARKER, PackageResolver, Resolution,
};

/// Re-exported so plugin authors don't need a direct dependency.
pub use async_trait::async_trait;
