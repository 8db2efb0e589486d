//! Watch Configuration Module
//!
//! Per-deployment configuration loaded from TOML files.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line (fatal if broken)
//! 2. `PARKING_WATCH_CONFIG` environment variable
//! 3. `parking_watch.toml` in the current working directory
//! 4. Built-in defaults
//!
//! The loaded config is handed to the pollers explicitly; nothing in the
//! library reads it from a global.

pub mod defaults;
pub mod validation;
mod watch_config;

pub use watch_config::*;
