//! CLI command implementations.

pub mod dump;
pub mod info;

use translog_core::{Log, OpenMode};
use std::path::Path;

/// Opens an existing log for reading.
pub fn open_log(path: &Path) -> Result<Log, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No log found at {}", path.display()).into());
    }
    let mut log = Log::new();
    log.open(path, OpenMode::Read)?;
    Ok(log)
}
