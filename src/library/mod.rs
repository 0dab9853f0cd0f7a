//! Recordings library.
//!
//! # Storage Layout
//!
//! ```text
//! <recordings>/
//! ├── call_20260301_093012.m4a
//! ├── call_20260301_093012_2.m4a    # second recording in the same second
//! └── call_20260302_181500.wav
//! ```

pub mod recordings;

pub use recordings::{list_recordings, RecordingFile};
