use std::path::Path;

use tracing::{debug, info};

use crate::HarnessError;

/// Read a module from disk
///
/// `.wat` files are assembled to the binary format first; anything else is
/// returned as-is and validated later by the harness.
pub fn load_module(path: &Path) -> Result<Vec<u8>, HarnessError> {
    let bytes = std::fs::read(path)?;
    info!(
        target: "harness",
        "Loaded module {} ({} bytes)",
        path.display(),
        bytes.len()
    );

    if path.extension().and_then(|s| s.to_str()) != Some("wat") {
        return Ok(bytes);
    }

    debug!(target: "harness", "Assembling text module {}", path.display());
    wat::parse_bytes(&bytes)
        .map(|binary| binary.into_owned())
        .map_err(|e| HarnessError::MalformedModule(format!("{}: {}", path.display(), e)))
}
