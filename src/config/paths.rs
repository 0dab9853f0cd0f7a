//! Canonical paths for callrec.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use callrec::config::{self, paths};
//!
//! let pattern = paths::recordings_glob(&config::recordings_dir()?);
//! ```
//!
//! ## Layout
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `<home>/journal.jsonl` | Session journal |
//! | `<recordings>/call_<YYYYMMDD_HHmmss>.<ext>` | One file per recording |

use std::path::Path;

/// Prefix shared by every recording file name
pub const RECORDING_PREFIX: &str = "call_";

/// Glob pattern matching every recording in `dir`
pub fn recordings_glob(dir: &Path) -> String {
    dir.join(format!("{}*", RECORDING_PREFIX))
        .to_string_lossy()
        .into_owned()
}
