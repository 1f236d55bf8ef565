//! Client-side state holders.
//!
//! SYSTEM CONTEXT
//! ==============
//! `session` owns authentication and role state for the whole application;
//! `verification` drives the Discord verification polling flow that runs
//! while an authenticated member is still unverified.

pub mod session;
pub mod verification;
