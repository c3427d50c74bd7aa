//! Aistore tablespace node entry
//!
//! Usage: `aistore-tblspc [config.json]`. Opens the node, replays the WAL
//! from the last checkpoint and shuts down cleanly.

// Use jemalloc as global allocator
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

use aistore_tblspc::acl::RoleRegistry;
use aistore_tblspc::{EngineConfig, TablespaceManager};
use std::process::ExitCode;
use std::sync::Arc;

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    env_logger::Builder::from_default_env()
        .filter_level(config.log_level.to_filter())
        .init();

    log::info!("Aistore tablespace node starting...");
    let manager = TablespaceManager::open(config, Arc::new(RoleRegistry::new()))?;
    let replayed = manager.startup_recovery()?;
    log::info!(
        "node ready: {} WAL records replayed, {} tablespaces",
        replayed,
        manager.tablespace_count()
    );
    manager.shutdown()?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("aistore-tblspc: {}", err);
            ExitCode::FAILURE
        }
    }
}
