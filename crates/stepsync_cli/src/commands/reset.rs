//! Reset command implementation.

use super::parse_doc;
use std::path::Path;
use stepsync_server::{ServerConfig, SyncService};
use stepsync_store::FileStepStore;
use tracing::info;

/// Runs the reset command.
pub fn run(path: &Path, doc: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No step store found at {:?}", path).into());
    }
    let doc = parse_doc(doc)?;
    let service = SyncService::new(ServerConfig::default(), FileStepStore::open(path)?);

    let before = service.version(&doc)?;
    let response = service.reset_document(&doc)?;
    info!(%doc, before, "document reset from the command line");

    println!("{} ({} steps discarded)", response.message, before);
    Ok(())
}
