//! # tbibi-settings
//!
//! Configuration for the tbibi backend, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`TbibiSettings::default()`]
//! 2. **User file**: `~/.tbibi/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TBIBI_*` overrides (highest priority)
//!
//! The binary applies its command-line flags on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, resolve_db_path, settings_path,
    tbibi_home,
};
pub use types::*;
