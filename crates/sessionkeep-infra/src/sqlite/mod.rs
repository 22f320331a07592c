//! SQLite relational store: session table and credential table behind one
//! shared split reader/writer pool.

pub mod credential;
pub mod pool;
pub mod session;

pub use credential::SqliteCredentialBackend;
pub use pool::{DatabasePool, SharedPool};
pub use session::SqliteSessionBackend;
