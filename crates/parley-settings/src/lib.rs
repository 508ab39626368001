//! # parley-settings
//!
//! Layered configuration for the Parley relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ParleySettings::default()`]
//! 2. **User file**: `~/.parley/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PARLEY_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
