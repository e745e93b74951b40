//! # stimmung-settings
//!
//! Layered configuration for the Stimmung room server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`StimmungSettings::default()`]
//! 2. **Settings file**: `~/.stimmung/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `PORT`, `NAME_PATTERN` and `STIMMUNG_*`
//!
//! The merged result is validated before it is returned.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, load_settings, load_settings_from_path,
    merge_into, settings_path,
};
pub use types::{
    LoggingSettings, MAX_MESSAGE_SIZE_RANGE, RoomSettings, ServerSettings, StimmungSettings,
};
