//! Exemption markers
//!
//! A marker file in the data directory skips shutdown monitoring for the
//! current run. It is checked once, before monitoring starts.

use std::path::{Path, PathBuf};
use tracing::debug;

/// The first marker in `markers` that exists
pub fn exemption_present(markers: &[PathBuf]) -> Option<&Path> {
    let found = markers.iter().find(|p| p.exists()).map(PathBuf::as_path);
    debug!(
        checked = markers.len(),
        found = ?found,
        "Checked exemption markers"
    );
    found
}
