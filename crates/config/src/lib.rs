//! Layered configuration for strata.
//!
//! Settings are resolved from (lowest to highest priority):
//!
//! | Priority | Source |
//! |----------|--------|
//! | 1 (lowest) | Built-in defaults ([`Settings::default`]) |
//! | 2 | Configuration file (`.toml`, `.yaml`/`.yml` or `.json`) |
//! | 3 (highest) | `STRATA_*` environment variables |
//!
//! Environment variables use double underscores to separate nested keys:
//! `STRATA_SCAN__MAX_BLOCK_SIZE=16384` sets `scan.max_block_size`.

pub mod error;
mod load;
mod settings;

pub use crate::load::default_config_path;
pub use crate::settings::{CacheKind, CacheSettings, ScanSettings, Settings, StoreSettings};
