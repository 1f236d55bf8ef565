//! Auth-session state for the current portal user.
//!
//! SYSTEM CONTEXT
//! ==============
//! One [`SessionManager`] exists per application. Route guards, the
//! verification flow and the CLI all read the same [`Session`] through
//! [`SessionManager::snapshot`] or a [`watch`] subscription; only the manager
//! mutates it.
//!
//! DESIGN
//! ======
//! Every change to `is_authenticated` goes through [`SessionManager::transition`],
//! which bumps a generation counter and then re-derives the member profile.
//! A profile fetch only lands if its generation is still current, so a slow
//! fetch started before a logout cannot repopulate `member` afterwards.
//!
//! Two lenient behaviors are kept on purpose and named here:
//! - a failed logout leaves `is_authenticated` untouched;
//! - a failed profile fetch clears `member` but does not de-authenticate.
//!
//! A successful login always re-derives the profile, even when the session
//! was already authenticated.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::net::api::{ApiError, SessionApi};
use crate::net::types::{Member, Registration};

/// Backend `detail` for a login whose account has no linked Discord identity.
pub const UNLINKED_DISCORD_DETAIL: &str = "Your account does not have a Discord ID associated with it.";
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials. Please try again.";
pub const REGISTRATION_FAILED_MESSAGE: &str = "Registration failed. Please try again.";

#[must_use]
pub fn unlinked_discord_message(username: &str) -> String {
    format!("Your discord is not verified. Please type /verify in the swecc server and enter {username}")
}

#[must_use]
pub fn registration_message(username: &str) -> String {
    format!("Registration successful. Please type /verify in the swecc server and enter {username}")
}

// =============================================================================
// SESSION
// =============================================================================

/// Authentication state tracking the current member and loading status.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub is_authenticated: bool,
    pub member: Option<Member>,
    /// True until the first session resolution (session check, then profile) settles.
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self { is_authenticated: false, member: None, loading: true, error: None }
    }
}

impl Session {
    /// Admin flag, derived from the fetched member's groups.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.authenticated_member().is_some_and(Member::is_admin)
    }

    /// Verified flag, derived from the fetched member's groups.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.authenticated_member().is_some_and(Member::is_verified)
    }

    fn authenticated_member(&self) -> Option<&Member> {
        if self.is_authenticated { self.member.as_ref() } else { None }
    }
}

// =============================================================================
// LOGIN FAILURE
// =============================================================================

/// How a rejected login is presented to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginFailure {
    /// Credentials were fine but the account still needs `/verify`.
    UnlinkedDiscord { username: String },
    InvalidCredentials,
}

impl LoginFailure {
    /// Classify a login error. `attempted` is used when the backend does not
    /// echo the username back.
    #[must_use]
    pub fn classify(err: &ApiError, attempted: &str) -> Self {
        if err.detail() == Some(UNLINKED_DISCORD_DETAIL) {
            let username = err.rejected_username().unwrap_or(attempted).to_string();
            Self::UnlinkedDiscord { username }
        } else {
            Self::InvalidCredentials
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::UnlinkedDiscord { username } => unlinked_discord_message(username),
            Self::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE.to_string(),
        }
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Owns the process-wide [`Session`] and every operation that changes it.
pub struct SessionManager {
    api: Arc<dyn SessionApi>,
    state: watch::Sender<Session>,
    generation: AtomicU64,
}

impl SessionManager {
    #[must_use]
    pub fn new(api: Arc<dyn SessionApi>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self { api, state, generation: AtomicU64::new(0) }
    }

    /// Current session state.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Observe session changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Startup check: resolve whether an existing session cookie is valid.
    pub async fn start(&self) {
        match self.api.check_session().await {
            Ok(()) => self.transition(true).await,
            Err(e) => {
                debug!(error = %e, "no valid session");
                self.state.send_modify(|s| s.loading = false);
                self.transition(false).await;
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str) {
        match self.api.login(username, password).await {
            Ok(()) => {
                info!(username, "login succeeded");
                self.api.refresh_csrf_token().await;
                self.state.send_modify(|s| s.error = None);
                self.transition(true).await;
            }
            Err(e) => {
                let failure = LoginFailure::classify(&e, username);
                warn!(username, error = %e, ?failure, "login failed");
                self.state.send_modify(|s| s.error = Some(failure.message()));
                if failure == LoginFailure::InvalidCredentials {
                    self.transition(false).await;
                }
            }
        }
    }

    /// End the session. A failed logout is logged and leaves the session as is.
    pub async fn logout(&self) {
        match self.api.logout().await {
            Ok(()) => {
                info!("logout succeeded");
                self.api.refresh_csrf_token().await;
                self.transition(false).await;
            }
            Err(e) => warn!(error = %e, "logout failed; session state left unchanged"),
        }
    }

    /// Create an account. On success the returned id is the new member's and
    /// `error` holds the verification instructions.
    pub async fn register(
        &self,
        first_name: &str,
        last_name: &str,
        username: &str,
        email: &str,
        password: &str,
        discord_username: &str,
    ) -> Option<i64> {
        let form = Registration {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            discord_username: discord_username.to_string(),
        };
        match self.api.register(&form).await {
            Ok(id) => {
                info!(username, id, "registration succeeded");
                self.state.send_modify(|s| s.error = Some(registration_message(username)));
                self.api.refresh_csrf_token().await;
                Some(id)
            }
            Err(e) => {
                warn!(username, error = %e, "registration failed");
                let message = e.detail().unwrap_or(REGISTRATION_FAILED_MESSAGE).to_string();
                self.state.send_modify(|s| s.error = Some(message));
                None
            }
        }
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error.take().is_some());
    }

    /// Re-fetch the member profile for the current authentication state, e.g.
    /// after the backend granted a new group.
    pub async fn refresh(&self) {
        let authenticated = self.state.borrow().is_authenticated;
        self.transition(authenticated).await;
    }

    /// Strict verification check for the poller: fetch errors propagate.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the profile fetch.
    pub async fn check_verified(&self) -> Result<bool, ApiError> {
        Ok(self.api.fetch_current_member().await?.is_verified())
    }

    /// Set `is_authenticated` and derive the member profile for it.
    async fn transition(&self, authenticated: bool) {
        let mut generation = 0;
        self.state.send_modify(|s| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            s.is_authenticated = authenticated;
            if !authenticated {
                s.member = None;
                s.loading = false;
            }
        });
        if authenticated {
            self.derive(generation).await;
        }
    }

    /// Fetch the profile and apply it only if `generation` is still current.
    async fn derive(&self, generation: u64) {
        let result = self.api.fetch_current_member().await;
        self.state.send_if_modified(|s| {
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "discarding stale profile fetch");
                return false;
            }
            match result {
                Ok(member) => s.member = Some(member),
                Err(e) => {
                    warn!(error = %e, "failed to fetch current member");
                    s.member = None;
                }
            }
            s.loading = false;
            true
        });
    }
}
