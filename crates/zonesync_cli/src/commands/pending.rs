//! Pending deletion queue commands.

use super::{CommandError, State};
use serde::Serialize;
use std::path::Path;
use zonesync_engine::PendingOperation;

/// Queue listing.
#[derive(Debug, Serialize)]
pub struct PendingListing {
    /// Queued operations, oldest first.
    pub operations: Vec<PendingOperation>,
    /// Ids awaiting deletion, deduplicated.
    pub deletions: Vec<String>,
}

/// Lists queued deletions.
pub fn list(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listing = listing(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        _ => {
            if listing.deletions.is_empty() {
                println!("No pending deletions");
            } else {
                println!(
                    "{} ids in {} operations:",
                    listing.deletions.len(),
                    listing.operations.len()
                );
                for id in &listing.deletions {
                    println!("  {id}");
                }
            }
        }
    }

    Ok(())
}

/// Reads the queue.
pub fn listing(path: &Path) -> Result<PendingListing, CommandError> {
    let state = State::open(path)?;
    let pending = state.pending()?;
    Ok(PendingListing {
        operations: pending.operations(),
        deletions: pending.pending_deletions(),
    })
}

/// Drops every queued deletion. The records stay on the server.
pub fn clear(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let dropped = clear_queue(path)?;
    tracing::warn!(count = dropped, "pending deletions dropped");
    println!("Cleared {dropped} pending deletions");
    Ok(())
}

/// Clears the queue and returns how many ids it held.
pub fn clear_queue(path: &Path) -> Result<usize, CommandError> {
    let state = State::open(path)?;
    let pending = state.pending()?;
    let count = pending.pending_deletions().len();
    pending.clear()?;
    Ok(count)
}
