//! # parley-settings
//!
//! Configuration for the parley channel server, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`ParleySettings::default()`]
//! 2. **Settings file**: `~/.parley/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PARLEY_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! let settings = parley_settings::load_settings().unwrap_or_default();
//! println!("history cap: {}", settings.channel.max_history);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, load_with_env, settings_path,
};
pub use types::*;
