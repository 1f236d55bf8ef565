use super::*;
use crate::net::types::{ADMIN_GROUP, VERIFIED_GROUP};
use crate::test_helpers::member_with_groups;

fn signed_in(groups: &[&str]) -> Session {
    Session { is_authenticated: true, member: Some(member_with_groups(groups)), loading: false, error: None }
}

fn signed_out() -> Session {
    Session { loading: false, ..Session::default() }
}

#[test]
fn public_routes_always_open() {
    assert_eq!(gate(&Session::default(), RouteAccess::Public), GateDecision::Allow);
    assert_eq!(gate(&signed_out(), RouteAccess::Public), GateDecision::Allow);
}

#[test]
fn loading_session_is_pending() {
    assert_eq!(gate(&Session::default(), RouteAccess::Member), GateDecision::Pending);
    assert_eq!(gate(&Session::default(), RouteAccess::Admin), GateDecision::Pending);
}

#[test]
fn unauthenticated_goes_to_auth() {
    assert_eq!(gate(&signed_out(), RouteAccess::Member), GateDecision::Redirect(AUTH_ROUTE));
    assert_eq!(gate(&signed_out(), RouteAccess::Admin), GateDecision::Redirect(AUTH_ROUTE));
}

#[test]
fn unverified_member_goes_to_auth() {
    assert_eq!(gate(&signed_in(&[]), RouteAccess::Member), GateDecision::Redirect(AUTH_ROUTE));
}

#[test]
fn verified_non_admin_is_sent_home_from_admin_routes() {
    let session = signed_in(&[VERIFIED_GROUP]);
    assert_eq!(gate(&session, RouteAccess::Member), GateDecision::Allow);
    assert_eq!(gate(&session, RouteAccess::Admin), GateDecision::Redirect(HOME_ROUTE));
}

#[test]
fn verified_admin_is_allowed_everywhere() {
    let session = signed_in(&[VERIFIED_GROUP, ADMIN_GROUP]);
    assert_eq!(gate(&session, RouteAccess::Admin), GateDecision::Allow);
}

#[test]
fn auth_entry_views() {
    assert_eq!(auth_entry(&signed_out()), AuthView::Form);
    assert_eq!(auth_entry(&signed_in(&[])), AuthView::Verification);
    assert_eq!(auth_entry(&signed_in(&[VERIFIED_GROUP])), AuthView::Home);
}

#[test]
fn auth_entry_without_profile_shows_form() {
    let mut session = signed_in(&[]);
    session.member = None;
    assert_eq!(auth_entry(&session), AuthView::Form);

    let mut session = signed_in(&[]);
    if let Some(member) = session.member.as_mut() {
        member.username.clear();
    }
    assert_eq!(auth_entry(&session), AuthView::Form);
}
