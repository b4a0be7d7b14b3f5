//! Build orchestration: deduplication, cache layers, trust-but-verify, import
//! rewriting and change propagation.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use helpers::{CountingPlugin, FailingPlugin, Project};
use kiln_build::{
    BuildError, BuildOrchestrator, CacheStore, FailurePolicy, FileChange, SharedPlugin,
};
use kiln_graph::HmrMessage;
use tempfile::TempDir;

const DEBOUNCE: Duration = Duration::from_millis(10);

fn orchestrator(project: &Project, plugins: Vec<SharedPlugin>) -> BuildOrchestrator {
    let mut builder = BuildOrchestrator::builder(project.root()).hmr_debounce(DEBOUNCE);
    for plugin in plugins {
        builder = builder.plugin(plugin);
    }
    builder.build().unwrap()
}

fn with_store(
    project: &Project,
    plugin: &CountingPlugin,
    store: &Arc<CacheStore>,
) -> BuildOrchestrator {
    BuildOrchestrator::builder(project.root())
        .plugin(plugin.shared())
        .cache_store(store.clone())
        .hmr_debounce(DEBOUNCE)
        .build()
        .unwrap()
}

async fn next_message(rx: &mut tokio::sync::mpsc::Receiver<String>) -> HmrMessage {
    let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for HMR message")
        .expect("client channel closed");
    serde_json::from_str(&payload).unwrap()
}

fn body(response: &kiln_build::ServedResponse) -> &str {
    std::str::from_utf8(&response.body).unwrap()
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_builds_share_one_run() {
    let project = Project::new();
    let path = project.write("a.x", "export default 1;");
    let plugin = CountingPlugin::new(".x", ".js").with_delay(Duration::from_millis(50));
    let orchestrator = orchestrator(&project, vec![plugin.shared()]);

    let results = join_all((0..16).map(|_| orchestrator.build(&path))).await;

    assert_eq!(plugin.runs(), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
    }
}

#[tokio::test]
async fn test_failed_build_shared_and_not_cached() {
    let project = Project::new();
    let path = project.write("a.x", "");
    let orchestrator = BuildOrchestrator::builder(project.root())
        .plugin(FailingPlugin::load(".x", ".js"))
        .policy(FailurePolicy::FailFast)
        .build()
        .unwrap();

    let (a, b) = tokio::join!(orchestrator.build(&path), orchestrator.build(&path));
    assert!(matches!(a, Err(BuildError::Pipeline { .. })));
    assert!(matches!(b, Err(BuildError::Pipeline { .. })));
    assert!(!orchestrator.is_hot(&path));

    // A later request tries again rather than replaying the failure.
    assert!(orchestrator.build(&path).await.is_err());
}

#[tokio::test]
async fn test_build_completes_when_caller_goes_away() {
    let project = Project::new();
    let path = project.write("a.x", "1");
    let plugin = CountingPlugin::new(".x", ".js").with_delay(Duration::from_millis(30));
    let orchestrator = orchestrator(&project, vec![plugin.shared()]);

    let abandoned = tokio::time::timeout(Duration::from_millis(1), orchestrator.build(&path)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(orchestrator.is_hot(&path));
    assert_eq!(plugin.runs(), 1);
}

// ---------------------------------------------------------------------------
// Caching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_repeat_serve_hits_hot_cache() {
    let project = Project::new();
    project.write("a.x", "export default 1;");
    let plugin = CountingPlugin::new(".x", ".js");
    let orchestrator = orchestrator(&project, vec![plugin.shared()]);

    let first = orchestrator.serve("/a.js").await.unwrap();
    let second = orchestrator.serve("/a.js").await.unwrap();

    assert_eq!(plugin.runs(), 1);
    assert_eq!(first.body, second.body);
    assert_eq!(first.etag, second.etag);
    assert_eq!(first.content_type, "application/javascript");
}

#[tokio::test]
async fn test_file_change_forces_fresh_build() {
    let project = Project::new();
    let path = project.write("a.x", "export default 1;");
    let plugin = CountingPlugin::new(".x", ".js");
    let orchestrator = orchestrator(&project, vec![plugin.shared()]);

    let before = orchestrator.serve("/a.js").await.unwrap();

    project.write("a.x", "export default 2;");
    orchestrator.on_file_change(&FileChange::Modified(path.clone()));
    assert!(!orchestrator.is_hot(&path));

    let after = orchestrator.serve("/a.js").await.unwrap();
    assert_eq!(plugin.runs(), 2);
    assert!(body(&after).contains("export default 2;"));
    assert_ne!(before.etag, after.etag);
}

#[tokio::test]
async fn test_persistent_entry_survives_restart() {
    let project = Project::new();
    project.write("a.x", "export default 1;");
    let cache_dir = TempDir::new().unwrap();
    let store = Arc::new(CacheStore::open(cache_dir.path()).unwrap());

    let plugin = CountingPlugin::new(".x", ".js");
    let first = with_store(&project, &plugin, &store)
        .serve("/a.js")
        .await
        .unwrap();
    assert_eq!(store.len().unwrap(), 1);

    let restarted = with_store(&project, &plugin, &store);
    let second = restarted.serve("/a.js").await.unwrap();
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn test_stale_persistent_entry_never_served() {
    let project = Project::new();
    project.write("a.x", "export default 1;");
    let cache_dir = TempDir::new().unwrap();
    let store = Arc::new(CacheStore::open(cache_dir.path()).unwrap());
    let plugin = CountingPlugin::new(".x", ".js");

    with_store(&project, &plugin, &store)
        .serve("/a.js")
        .await
        .unwrap();

    // Edited while the server was down.
    project.write("a.x", "export default 2;");

    let restarted = with_store(&project, &plugin, &store);
    let response = restarted.serve("/a.js").await.unwrap();
    assert!(body(&response).contains("export default 2;"));
    assert_eq!(plugin.runs(), 2);
}

#[tokio::test]
async fn test_file_change_removes_persistent_entry() {
    let project = Project::new();
    let path = project.write("a.x", "1");
    let cache_dir = TempDir::new().unwrap();
    let store = Arc::new(CacheStore::open(cache_dir.path()).unwrap());
    let plugin = CountingPlugin::new(".x", ".js");
    let orchestrator = with_store(&project, &plugin, &store);

    orchestrator.serve("/a.js").await.unwrap();
    assert!(!store.is_empty().unwrap());

    orchestrator.on_file_change(&FileChange::Modified(path));
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn test_change_during_build_starts_fresh_build() {
    let project = Project::new();
    let path = project.write("a.x", "v1");
    let cache_dir = TempDir::new().unwrap();
    let store = Arc::new(CacheStore::open(cache_dir.path()).unwrap());
    let plugin = CountingPlugin::new(".x", ".js").with_delay(Duration::from_millis(300));
    let orchestrator = with_store(&project, &plugin, &store);

    let stale = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.serve("/a.js").await }
    });

    // The first build has read "v1" and is still running.
    tokio::time::sleep(Duration::from_millis(100)).await;
    project.write("a.x", "v2");
    orchestrator.on_file_change(&FileChange::Modified(path.clone()));

    let fresh = orchestrator.serve("/a.js").await.unwrap();
    assert_eq!(body(&fresh), "v2");

    let stale = stale.await.unwrap().unwrap();
    assert_eq!(body(&stale), "v1");
    assert_eq!(plugin.runs(), 2);

    // A finished stale build must not replace the fresh one.
    let again = orchestrator.serve("/a.js").await.unwrap();
    assert_eq!(body(&again), "v2");
    assert_eq!(plugin.runs(), 2);
    drop(orchestrator);

    let restarted = with_store(&project, &plugin, &store);
    let after_restart = restarted.serve("/a.js").await.unwrap();
    assert_eq!(body(&after_restart), "v2");
}

#[tokio::test]
async fn test_verification_mismatch_clears_caches_and_reloads() {
    let project = Project::new();
    project.write("a.x", "export default 1;");
    let cache_dir = TempDir::new().unwrap();
    let store = Arc::new(CacheStore::open(cache_dir.path()).unwrap());
    let plugin = CountingPlugin::new(".x", ".js");
    plugin.set_prefix("// v1\n");

    with_store(&project, &plugin, &store)
        .serve("/a.js")
        .await
        .unwrap();

    // Same source, but the plugin now produces different output.
    plugin.set_prefix("// v2\n");
    let restarted = with_store(&project, &plugin, &store);
    let (_id, mut rx) = restarted.hmr().register_client();

    let trusted = restarted.serve("/a.js").await.unwrap();
    assert!(body(&trusted).contains("// v1"));

    assert_eq!(next_message(&mut rx).await, HmrMessage::Reload);
    assert!(store.is_empty().unwrap());
    assert!(!restarted.is_hot(&project.path("a.x")));

    let fresh = restarted.serve("/a.js").await.unwrap();
    assert!(body(&fresh).contains("// v2"));
}

#[tokio::test]
async fn test_verification_match_is_silent() {
    let project = Project::new();
    project.write("a.x", "export default 1;");
    let cache_dir = TempDir::new().unwrap();
    let store = Arc::new(CacheStore::open(cache_dir.path()).unwrap());
    let plugin = CountingPlugin::new(".x", ".js");

    with_store(&project, &plugin, &store)
        .serve("/a.js")
        .await
        .unwrap();

    let restarted = with_store(&project, &plugin, &store);
    let (_id, mut rx) = restarted.hmr().register_client();
    restarted.serve("/a.js").await.unwrap();

    for _ in 0..100 {
        if plugin.runs() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(plugin.runs(), 2);

    tokio::time::sleep(DEBOUNCE * 10).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(store.len().unwrap(), 1);
}

// ---------------------------------------------------------------------------
// URL mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_url_is_not_found() {
    let project = Project::new();
    let orchestrator = orchestrator(&project, Vec::new());

    let err = orchestrator.serve("/missing.js").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_url_collision_fails_fast() {
    let project = Project::new();
    project.write("a.js", "1");
    project.write("a.x", "2");
    let plugin = CountingPlugin::new(".x", ".js");
    let orchestrator = orchestrator(&project, vec![plugin.shared()]);

    let err = orchestrator.serve("/a.js").await.unwrap_err();
    assert!(matches!(err, BuildError::UrlCollision { ref candidates, .. } if candidates.len() == 2));
    assert_eq!(plugin.runs(), 0);
}

#[tokio::test]
async fn test_mounted_directories() {
    let project = Project::new();
    project.write("public/index.html", "<html><body></body></html>");
    project.write("src/app.js", "export const app = 1;");

    let orchestrator = BuildOrchestrator::builder(project.root())
        .mount("public", "/")
        .mount("src", "/_dist_")
        .build()
        .unwrap();

    let page = orchestrator.serve("/").await.unwrap();
    assert_eq!(page.content_type, "text/html; charset=utf-8");

    let app = orchestrator.serve("/_dist_/app.js?mtime=1").await.unwrap();
    assert_eq!(app.url, "/_dist_/app.js");
}

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_script_imports_rewritten_and_recorded() {
    let project = Project::new();
    project.write(
        "index.js",
        "import { b } from './b';\nimport './style.css';\nimport cfg from './data.json';\n",
    );
    project.write("b.js", "export const b = 1;");
    project.write("style.css", "body { margin: 0; }");
    project.write("data.json", "{\"a\": 1}");
    let orchestrator = orchestrator(&project, Vec::new());

    let response = orchestrator.serve("/index.js").await.unwrap();
    let code = body(&response);
    assert!(code.contains("from '/b.js'"));
    assert!(code.contains("import '/style.css.proxy.js'"));
    assert!(code.contains("from '/data.json.proxy.js'"));

    let node = orchestrator.hmr().get_entry("/index.js").unwrap();
    let deps: Vec<&str> = node.dependencies.iter().map(String::as_str).collect();
    assert_eq!(deps, vec!["/b.js", "/style.css.proxy.js", "/data.json.proxy.js"]);
    assert!(!node.is_hmr_enabled);
}

#[tokio::test]
async fn test_unresolved_import_left_unchanged() {
    let project = Project::new();
    project.write("index.js", "import React from 'react';");
    let orchestrator = orchestrator(&project, Vec::new());

    let response = orchestrator.serve("/index.js").await.unwrap();
    assert_eq!(body(&response), "import React from 'react';");
}

#[tokio::test]
async fn test_hot_module_gets_prelude() {
    let project = Project::new();
    project.write("a.js", "import.meta.hot.accept();\nexport const a = 1;");
    let orchestrator = orchestrator(&project, Vec::new());

    let response = orchestrator.serve("/a.js").await.unwrap();
    assert!(body(&response).starts_with("import * as __KILN_HMR__ from '/__kiln__/hmr-client.js';"));
    assert!(orchestrator.hmr().get_entry("/a.js").unwrap().is_hmr_enabled);
}

#[tokio::test]
async fn test_no_prelude_when_hmr_disabled() {
    let project = Project::new();
    project.write("a.js", "if (import.meta.hot) {}");
    project.write("index.html", "<html><body></body></html>");
    let orchestrator = BuildOrchestrator::builder(project.root())
        .hmr(false)
        .build()
        .unwrap();

    let script = orchestrator.serve("/a.js").await.unwrap();
    assert_eq!(body(&script), "if (import.meta.hot) {}");

    let page = orchestrator.serve("/index.html").await.unwrap();
    assert!(!body(&page).contains("hmr-client.js"));
}

#[tokio::test]
async fn test_html_gets_client_script() {
    let project = Project::new();
    project.write("index.html", "<html><body><h1>hi</h1></body></html>");
    let orchestrator = orchestrator(&project, Vec::new());

    let page = orchestrator.serve("/index.html").await.unwrap();
    assert!(body(&page).contains(r#"<script type="module" src="/__kiln__/hmr-client.js"></script>"#));
}

#[tokio::test]
async fn test_css_proxy_is_self_accepting() {
    let project = Project::new();
    project.write("style.css", "body { margin: 0; }");
    let orchestrator = orchestrator(&project, Vec::new());

    let proxy = orchestrator.serve("/style.css.proxy.js").await.unwrap();
    assert_eq!(proxy.content_type, "application/javascript");
    assert!(body(&proxy).contains("document.createElement('style')"));

    let node = orchestrator.hmr().get_entry("/style.css.proxy.js").unwrap();
    assert!(node.is_hmr_accepted);

    let raw = orchestrator.serve("/style.css").await.unwrap();
    assert_eq!(raw.content_type, "text/css");
    assert_eq!(body(&raw), "body { margin: 0; }");
}

#[tokio::test]
async fn test_asset_proxy_exports_url() {
    let project = Project::new();
    project.write("img/logo.svg", "<svg/>");
    let orchestrator = orchestrator(&project, Vec::new());

    let proxy = orchestrator.serve("/img/logo.svg.proxy.js").await.unwrap();
    assert_eq!(body(&proxy), "export default \"/img/logo.svg\";\n");
}

// ---------------------------------------------------------------------------
// Change propagation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_change_without_boundary_reloads() {
    let project = Project::new();
    project.write("index.js", "import './b.js';");
    let b = project.write("b.js", "export const b = 1;");
    let orchestrator = orchestrator(&project, Vec::new());
    let (_id, mut rx) = orchestrator.hmr().register_client();

    orchestrator.serve("/index.js").await.unwrap();
    orchestrator.serve("/b.js").await.unwrap();

    orchestrator.on_file_change(&FileChange::Modified(b));
    assert_eq!(next_message(&mut rx).await, HmrMessage::Reload);
}

#[tokio::test]
async fn test_change_stops_at_accepting_module() {
    let project = Project::new();
    project.write("index.js", "import './b.js';");
    let b = project.write("b.js", "import.meta.hot.accept();");
    let orchestrator = orchestrator(&project, Vec::new());
    let (_id, mut rx) = orchestrator.hmr().register_client();

    orchestrator.serve("/index.js").await.unwrap();
    orchestrator.serve("/b.js").await.unwrap();
    orchestrator
        .hmr()
        .handle_client_message(r#"{"type":"hotAccept","id":"/b.js"}"#);

    orchestrator.on_file_change(&FileChange::Modified(b));
    assert_eq!(next_message(&mut rx).await, HmrMessage::update("/b.js"));
}

#[tokio::test]
async fn test_replaced_dependency_gets_cache_busting_query() {
    let project = Project::new();
    project.write("b.js", "import './c.js';\nimport.meta.hot.accept();");
    let c = project.write("c.js", "export const c = 1;");
    let orchestrator = orchestrator(&project, Vec::new());

    orchestrator.serve("/b.js").await.unwrap();
    orchestrator.serve("/c.js").await.unwrap();
    orchestrator.hmr().accept("/b.js");

    orchestrator.on_file_change(&FileChange::Modified(c));
    assert!(orchestrator.hmr().needs_replacement("/c.js"));

    let b = orchestrator.serve("/b.js").await.unwrap();
    assert!(body(&b).contains("import '/c.js?mtime="));

    // Fetching the replaced module clears its mark.
    orchestrator.serve("/c.js").await.unwrap();
    assert!(!orchestrator.hmr().needs_replacement("/c.js"));
    let b = orchestrator.serve("/b.js").await.unwrap();
    assert!(body(&b).contains("import '/c.js';"));
}

#[tokio::test]
async fn test_html_change_reloads() {
    let project = Project::new();
    let page = project.write("index.html", "<html></html>");
    let orchestrator = orchestrator(&project, Vec::new());
    let (_id, mut rx) = orchestrator.hmr().register_client();

    orchestrator.on_file_change(&FileChange::Modified(page));
    assert_eq!(next_message(&mut rx).await, HmrMessage::Reload);
}

#[tokio::test]
async fn test_change_to_unloaded_file_is_quiet() {
    let project = Project::new();
    let path = project.write("never-served.js", "1");
    let orchestrator = orchestrator(&project, Vec::new());
    let (_id, mut rx) = orchestrator.hmr().register_client();

    orchestrator.on_file_change(&FileChange::Created(path));
    tokio::time::sleep(DEBOUNCE * 10).await;
    assert!(rx.try_recv().is_err());
}
