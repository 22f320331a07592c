//! Shared domain types for sessionkeep.
//!
//! This crate contains the types passed across the persistence boundary:
//! session metadata records and patches, credential keys and payloads,
//! store configuration, and the error types used by every backend.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod credential;
pub mod error;
pub mod session;
