//! Route gating derived from session state.
//!
//! DESIGN
//! ======
//! Gates never act while the session is still loading; the caller re-evaluates
//! on the next session change. Unauthenticated and unverified members are both
//! sent to the auth page, where [`auth_entry`] picks the form or the
//! verification flow.

#[cfg(test)]
#[path = "route_guard_test.rs"]
mod route_guard_test;

use crate::state::session::Session;

pub const AUTH_ROUTE: &str = "/auth";
pub const HOME_ROUTE: &str = "/";

/// Who may open a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Member,
    Admin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Session not resolved yet; render nothing.
    Pending,
    Allow,
    Redirect(&'static str),
}

/// Decide whether `session` may open a route with the given access level.
#[must_use]
pub fn gate(session: &Session, access: RouteAccess) -> GateDecision {
    if access == RouteAccess::Public {
        return GateDecision::Allow;
    }
    if session.loading {
        return GateDecision::Pending;
    }
    if !session.is_authenticated || !session.is_verified() {
        return GateDecision::Redirect(AUTH_ROUTE);
    }
    if access == RouteAccess::Admin && !session.is_admin() {
        return GateDecision::Redirect(HOME_ROUTE);
    }
    GateDecision::Allow
}

/// What the auth page shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthView {
    /// Login / register form.
    Form,
    /// Authenticated but unverified: run the verification poller.
    Verification,
    /// Fully signed in; leave the auth page.
    Home,
}

#[must_use]
pub fn auth_entry(session: &Session) -> AuthView {
    if !session.is_authenticated {
        return AuthView::Form;
    }
    if session.is_verified() {
        return AuthView::Home;
    }
    match &session.member {
        Some(member) if !member.username.is_empty() => AuthView::Verification,
        _ => AuthView::Form,
    }
}
