//! Backend trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (sessionkeep-infra) implements. The traits use native async fn in traits;
//! the `Box*` wrappers provide dynamic dispatch for runtime backend selection.

pub mod box_backend;
pub mod credential;
pub mod fallback;
pub mod managed;
pub mod session;

pub use box_backend::{BoxCredentialBackend, BoxSessionBackend};
pub use credential::CredentialBackend;
pub use fallback::FallbackCredentialBackend;
pub use managed::ManagedBackend;
pub use session::SessionBackend;
