//! Utility helpers shared by frontends of the session state.
//!
//! SYSTEM CONTEXT
//! ==============
//! Navigation decisions are derived purely from a [`crate::state::session::Session`]
//! snapshot so every frontend applies identical redirects.

pub mod route_guard;
