//! Song generation funnel for serenata.
//!
//! Turns completed form answers into one or two generated songs, lets the
//! user compare them (recovering the list after reloads or from shared
//! links), and hands the chosen songs to checkout.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod api;
pub mod compare;
pub mod config;
pub mod error;
pub mod generate;
pub mod policy;
pub mod poll;
pub mod services;
pub mod state;
pub mod track;

pub use compare::{
    CheckoutRedirect, ComparisonController, EntryQuery, EntrySources, Handoff, HandoffSongs,
    PendingSlot, SecondRequest, SongSource,
};
pub use config::{Config, FunnelMode};
pub use error::{ApiError, ApiResult, ComparisonError, GenerationError};
pub use generate::{GenerationOrchestrator, RunPhase};
pub use policy::GenerationPolicy;
pub use services::Services;
pub use state::AppState;
pub use track::{FunnelEvent, NoopTracker, Tracker};
