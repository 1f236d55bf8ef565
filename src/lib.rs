//! Client core for the member portal.
//!
//! SYSTEM CONTEXT
//! ==============
//! The portal backend owns accounts, the member directory and the admin
//! command surface. This crate owns the client side of that conversation:
//! session state derivation, Discord verification polling, route gating and
//! the thin HTTP layer those pieces talk through.

pub mod admin;
pub mod config;
pub mod net;
pub mod state;
pub mod util;

#[cfg(test)]
pub(crate) mod test_helpers;
