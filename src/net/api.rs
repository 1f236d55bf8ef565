//! REST collaborator contract and its reqwest-backed implementation.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session manager and verification poller only see [`SessionApi`], so
//! tests drive them with scripted mocks. [`HttpApi`] is the production
//! implementation: a cookie-backed session plus an anti-forgery token that is
//! fetched lazily and replayed on every request.
//!
//! ERROR HANDLING
//! ==============
//! Every call returns `Result<_, ApiError>`. Rejections keep the backend's
//! `detail`/`username` so callers can tell an unlinked Discord account apart
//! from bad credentials. Token refreshes are best-effort and only log.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{
    AuthErrorBody, LoginRequest, MAX_PICTURE_BYTES, Member, MemberUpdate, PasswordResetRequest, PictureUpload,
    RegisterResponse, Registration, picture_mime,
};
use crate::config::ApiConfig;

pub(crate) const CSRF_PATH: &str = "/auth/csrf/";
pub(crate) const CSRF_HEADER: &str = "X-CSRFToken";
const SESSION_PATH: &str = "/auth/session/";
const LOGIN_PATH: &str = "/auth/login/";
const LOGOUT_PATH: &str = "/auth/logout/";
const REGISTER_PATH: &str = "/auth/register/";
const PROFILE_PATH: &str = "/members/profile/";
const PICTURE_UPLOAD_PATH: &str = "/members/profile/picture/upload/";

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by portal API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a status the call does not accept.
    #[error("request rejected with status {status}")]
    Rejected {
        status: u16,
        detail: Option<String>,
        username: Option<String>,
    },

    /// The response body could not be deserialized.
    #[error("response parse failed: {0}")]
    Decode(String),

    /// The request was refused locally before anything was sent.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ApiError {
    /// Backend-provided `detail` message, if this is a rejection carrying one.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Backend-echoed username, if this is a rejection carrying one.
    #[must_use]
    pub fn rejected_username(&self) -> Option<&str> {
        match self {
            Self::Rejected { username, .. } => username.as_deref(),
            _ => None,
        }
    }
}

// =============================================================================
// COLLABORATOR TRAIT
// =============================================================================

/// Backend calls the session manager depends on. Enables mocking in tests.
#[async_trait::async_trait]
pub trait SessionApi: Send + Sync {
    /// Confirm an existing session cookie is still valid.
    async fn check_session(&self) -> Result<(), ApiError>;

    /// Exchange credentials for a session.
    async fn login(&self, username: &str, password: &str) -> Result<(), ApiError>;

    /// End the current session.
    async fn logout(&self) -> Result<(), ApiError>;

    /// Create an account, returning the new member id.
    async fn register(&self, form: &Registration) -> Result<i64, ApiError>;

    /// Fetch the authenticated member's own profile.
    async fn fetch_current_member(&self) -> Result<Member, ApiError>;

    /// Refresh the anti-forgery token. Best-effort; never fails.
    async fn refresh_csrf_token(&self);
}

// =============================================================================
// PATHS
// =============================================================================

pub(crate) fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn member_path(member_id: i64) -> String {
    format!("/members/{member_id}/")
}

fn password_reset_path(uid: &str, token: &str) -> String {
    format!("/auth/password-reset-confirm/{uid}/{token}/")
}

/// Map a non-accepted response into [`ApiError::Rejected`], keeping whatever
/// `detail`/`username` the body carries.
pub(crate) fn rejection(status: u16, body: &str) -> ApiError {
    let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    ApiError::Rejected { status, detail: parsed.detail.or(parsed.error), username: parsed.username }
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

/// Reqwest client bound to one backend, holding the session cookie jar and
/// the current anti-forgery token.
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    csrf_token: RwLock<Option<String>>,
}

impl HttpApi {
    /// Build a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the TLS backend or cookie
    /// store cannot be initialized.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.clone(), csrf_token: RwLock::new(None) })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Currently held anti-forgery token, if any.
    #[must_use]
    pub fn csrf_token(&self) -> Option<String> {
        self.csrf_token
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn store_csrf_token(&self, token: String) {
        *self
            .csrf_token
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(token);
    }

    /// Start a request, fetching an anti-forgery token first when none is held.
    pub(crate) async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        if path != CSRF_PATH && self.csrf_token().is_none() {
            self.refresh_csrf_token().await;
        }
        let mut builder = self.http.request(method, endpoint_url(&self.base_url, path));
        if let Some(token) = self.csrf_token() {
            builder = builder.header(CSRF_HEADER, token);
        }
        builder
    }

    /// Send and read the whole body. Status interpretation is left to callers.
    pub(crate) async fn execute(builder: RequestBuilder) -> Result<(StatusCode, String), ApiError> {
        let response = builder.send().await.map_err(|e| ApiError::Request(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::Request(e.to_string()))?;
        Ok((status, body))
    }

    /// GET `path`, require 200 and decode the body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let (status, body) = Self::execute(self.request(Method::GET, path).await).await?;
        if status != StatusCode::OK {
            return Err(rejection(status.as_u16(), &body));
        }
        decode(&body)
    }

    /// Fetch another member's profile via `/members/{id}/`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, non-200 status or a
    /// malformed body.
    pub async fn member_profile(&self, member_id: i64) -> Result<Member, ApiError> {
        self.get_json(&member_path(member_id)).await
    }

    /// Apply a partial update to the caller's own profile.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, non-200 status or a
    /// malformed body.
    pub async fn update_profile(&self, update: &MemberUpdate) -> Result<Member, ApiError> {
        let builder = self.request(Method::PUT, PROFILE_PATH).await.json(update);
        let (status, body) = Self::execute(builder).await?;
        if status != StatusCode::OK {
            return Err(rejection(status.as_u16(), &body));
        }
        decode(&body)
    }

    /// Complete a password reset from an emailed link.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure or a non-200 status.
    pub async fn reset_password(&self, uid: &str, token: &str, new_password: &str) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, &password_reset_path(uid, token))
            .await
            .json(&PasswordResetRequest { new_password });
        let (status, body) = Self::execute(builder).await?;
        if status != StatusCode::OK {
            return Err(rejection(status.as_u16(), &body));
        }
        Ok(())
    }

    /// Upload a new profile picture as `multipart/form-data`, returning the
    /// stored image URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Invalid`] without sending anything when the file
    /// is over [`MAX_PICTURE_BYTES`] or not a JPEG, PNG or GIF; otherwise an
    /// [`ApiError`] on transport failure, non-200 status or a malformed body.
    pub async fn upload_profile_picture(&self, file_name: &str, bytes: Vec<u8>) -> Result<PictureUpload, ApiError> {
        if bytes.len() > MAX_PICTURE_BYTES {
            return Err(ApiError::Invalid(format!("{file_name} is larger than 5MB")));
        }
        let mime = picture_mime(file_name)
            .ok_or_else(|| ApiError::Invalid(format!("{file_name} is not a JPEG, PNG or GIF image")))?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_owned())
            .mime_str(mime)
            .map_err(|e| ApiError::Invalid(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("profile_picture", part);

        let builder = self.request(Method::POST, PICTURE_UPLOAD_PATH).await.multipart(form);
        let (status, body) = Self::execute(builder).await?;
        if status != StatusCode::OK {
            return Err(rejection(status.as_u16(), &body));
        }
        decode(&body)
    }

    /// Lenient verification check: any failure reads as "not verified".
    pub async fn is_current_member_verified(&self) -> bool {
        match self.fetch_current_member().await {
            Ok(member) => member.is_verified(),
            Err(e) => {
                debug!(error = %e, "verification check failed; treating as unverified");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl SessionApi for HttpApi {
    async fn check_session(&self) -> Result<(), ApiError> {
        let (status, body) = Self::execute(self.request(Method::GET, SESSION_PATH).await).await?;
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body));
        }
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, LOGIN_PATH)
            .await
            .json(&LoginRequest { username, password });
        let (status, body) = Self::execute(builder).await?;
        if status != StatusCode::OK {
            return Err(rejection(status.as_u16(), &body));
        }
        Ok(())
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let (status, body) = Self::execute(self.request(Method::POST, LOGOUT_PATH).await).await?;
        if status != StatusCode::OK {
            return Err(rejection(status.as_u16(), &body));
        }
        Ok(())
    }

    async fn register(&self, form: &Registration) -> Result<i64, ApiError> {
        let builder = self.request(Method::POST, REGISTER_PATH).await.json(form);
        let (status, body) = Self::execute(builder).await?;
        if status != StatusCode::CREATED {
            return Err(rejection(status.as_u16(), &body));
        }
        let created: RegisterResponse = decode(&body)?;
        Ok(created.id)
    }

    async fn fetch_current_member(&self) -> Result<Member, ApiError> {
        self.get_json(PROFILE_PATH).await
    }

    async fn refresh_csrf_token(&self) {
        let builder = self.http.get(endpoint_url(&self.base_url, CSRF_PATH));
        match builder.send().await {
            Ok(response) => {
                let token = response
                    .headers()
                    .get("x-csrftoken")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                if let Some(token) = token {
                    debug!("anti-forgery token refreshed");
                    self.store_csrf_token(token);
                }
            }
            Err(e) => warn!(error = %e, "failed to fetch anti-forgery token"),
        }
    }
}
