//! Core domain types for the muster scatter-gather coordination gateway.
//!
//! This crate defines the canonical data model shared by the gateway and its
//! backend adapters:
//! - Request and part identifiers
//! - The request record persisted per live operation
//! - The completion probe result
//! - Backend configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::BackendConfig;
pub use error::{Error, Result};
pub use types::{Completion, LockerId, PartId, RequestId, RequestRecord};

/// Maximum accepted identifier length in bytes.
///
/// Matches the tightest backend key limit (the wide-column sort key), so an
/// identifier accepted here is storable by every reference backend.
pub const MAX_ID_LEN: usize = 1024;
