//! Networking modules for the portal REST backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` holds the session collaborator contract and the HTTP client,
//! `directory` the cached member directory, `reports` and `engagement` the
//! moderation and activity endpoints, and `types` the wire schema.

pub mod api;
pub mod directory;
pub mod engagement;
pub mod reports;
pub mod types;
