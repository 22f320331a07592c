//! Embedded document store (redb): one JSON document per session plus the
//! credential table, sharing a single database file.

pub mod credential;
pub mod db;
pub mod session;

pub use credential::DocumentCredentialBackend;
pub use db::DocumentDb;
pub use session::DocumentSessionBackend;
