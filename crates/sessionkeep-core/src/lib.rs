//! Persistence coordination for sessionkeep.
//!
//! This crate defines the backend "ports" (`SessionBackend`,
//! `CredentialBackend`) that the infrastructure layer implements, and the
//! coordination that sits in front of them: TTL caches, debounced write
//! buffers, backend health routing, and the credential hooks consumed by the
//! protocol runtime. It depends only on `sessionkeep-types`, never on
//! `sessionkeep-infra` or any database crate.

pub mod auth_state;
pub mod backend;
pub mod buffer;
pub mod cache;
pub mod codec;
pub mod coordinator;
pub mod credential;
pub mod health;

#[cfg(test)]
pub(crate) mod testing;
