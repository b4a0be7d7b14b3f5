//! `kiln dev`: serve the project and push hot updates.

use crate::cli::DevArgs;
use crate::dev::{DevServer, FileWatcher};
use crate::error::{CliError, Result};
use crate::project::{ProjectOptions, build_orchestrator, load_config};
use crate::ui;
use kiln_build::{BuildOrchestrator, FileChange};
use tokio::signal;

/// Execute the dev command.
///
/// 1. Load and validate configuration (flags > env > file > defaults)
/// 2. Assemble the orchestrator with the persistent cache
/// 3. Start the file watcher and the HTTP server
/// 4. Feed file changes to the orchestrator until Ctrl+C
pub async fn execute(args: DevArgs) -> Result<()> {
    let config = load_config(&args.root, args.config.as_deref(), &args.overrides())?;
    let orchestrator = build_orchestrator(&config, &ProjectOptions::dev(&config), Vec::new())?;

    for mount in config.resolved_mounts() {
        let dir = mount
            .dir
            .strip_prefix(&config.root)
            .unwrap_or(&mount.dir)
            .display()
            .to_string();
        ui::file_line(&mount.url, &format!("-> {}", if dir.is_empty() { "." } else { dir.as_str() }));
    }
    if !config.dev.hmr {
        ui::info("Hot module replacement is disabled");
    }

    let (watcher, mut change_rx) = FileWatcher::new(
        config.root.clone(),
        config.dev.watch_ignore.clone(),
        config.dev.watch_debounce_ms,
    )?;
    ui::info(&format!("Watching for changes in: {}", watcher.root().display()));

    let server = DevServer::new(&config, orchestrator.clone());
    let mut server_handle = tokio::spawn(server.start());

    loop {
        tokio::select! {
            Some(change) = change_rx.recv() => {
                handle_file_change(&orchestrator, &change, &config.root);
            }
            _ = signal::ctrl_c() => {
                ui::info("Shutting down...");
                server_handle.abort();
                break;
            }
            result = &mut server_handle => {
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(err),
                    Err(err) => Err(CliError::Server(format!("server task failed: {}", err))),
                };
            }
        }
    }

    ui::success("Development server stopped");
    Ok(())
}

fn handle_file_change(orchestrator: &BuildOrchestrator, change: &FileChange, root: &std::path::Path) {
    let path = change.path();
    let display = path.strip_prefix(root).unwrap_or(path).display();
    match change {
        FileChange::Removed(_) => ui::info(&format!("File removed: {}", display)),
        _ => ui::info(&format!("File changed: {}", display)),
    }
    orchestrator.on_file_change(change);
}
