//! Core domain model for serenata.
//!
//! This crate defines the funnel's plain records (form answers, generation
//! jobs, song references, checkout selection), the key/value storage seam,
//! and the versioned session store that survives reloads.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod session;
pub mod storage;

pub use error::{Error, Result};
pub use session::{Page, SessionRecord, SessionStore, APP_VERSION};
pub use storage::{MemoryStorage, SqliteStorage, Storage};
