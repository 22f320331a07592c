//! Infrastructure layer for sessionkeep.
//!
//! Contains implementations of the backend traits defined in
//! `sessionkeep-core`: the SQLite relational store, the redb document store,
//! and the filesystem credential fallback with its orphan sweep. Also loads
//! `sessionkeep.toml` and wires everything together in [`open_stores`].

pub mod bootstrap;
pub mod config;
pub mod document;
pub mod filesystem;
pub mod sqlite;

pub use bootstrap::{Stores, open_stores};
