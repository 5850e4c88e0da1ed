//! Object store contract for strata scans.
//!
//! A scan only ever needs three things from a blob store: paginated listing
//! by key prefix, metadata for a single key, and a byte stream for a single
//! key. [`ObjectStore`] captures exactly that; everything else (credentials,
//! retries, transport) belongs to the backend.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::ObjectStore;
pub use crate::models::{ListPage, ObjectMeta, ReadHint};
pub use crate::path::{validate_key, validate_prefix};
use std::sync::Arc;

pub type StoreHandle = Arc<dyn ObjectStore>;
