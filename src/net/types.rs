//! Wire DTOs for the portal REST backend.
//!
//! DESIGN
//! ======
//! Field names follow the backend's snake_case payloads so serde needs no
//! per-field renames. Role flags are never stored; they are read off the
//! member's group list.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Group granting admin rights.
pub const ADMIN_GROUP: &str = "is_admin";
/// Group granted once the Discord identity is linked.
pub const VERIFIED_GROUP: &str = "is_verified";

// =============================================================================
// MEMBER
// =============================================================================

/// A linked social account handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialField {
    pub username: String,
    #[serde(rename = "isPrivate", default)]
    pub is_private: bool,
}

/// A named permission group attached to a member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
}

/// A portal member profile as returned by `/members/profile/` and the
/// directory endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub username: String,
    /// ISO 8601 creation timestamp as sent by the backend.
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub discord_username: String,
    /// Discord snowflake; absent until the account is linked.
    #[serde(default, deserialize_with = "deserialize_optional_snowflake")]
    pub discord_id: Option<u64>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub grad_date: Option<String>,
    #[serde(default)]
    pub linkedin: Option<SocialField>,
    #[serde(default)]
    pub github: Option<SocialField>,
    #[serde(default)]
    pub leetcode: Option<SocialField>,
    #[serde(default)]
    pub resume_url: Option<String>,
    #[serde(default)]
    pub local: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

impl Member {
    /// Whether the member belongs to the named group.
    #[must_use]
    pub fn in_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.in_group(ADMIN_GROUP)
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.in_group(VERIFIED_GROUP)
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() { self.username.clone() } else { full.to_string() }
    }
}

/// Partial profile update for `PUT /members/profile/`. Unset fields are
/// omitted from the body so the backend leaves them untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemberUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discord_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grad_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<SocialField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<SocialField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leetcode: Option<SocialField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Paginated list envelope used by the directory search endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

// =============================================================================
// AUTH PAYLOADS
// =============================================================================

/// Body for `POST /auth/register/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub discord_username: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterResponse {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct PasswordResetRequest<'a> {
    pub new_password: &'a str,
}

/// Error body the backend attaches to rejected auth requests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AuthErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    /// Echoed username, present on the unlinked-Discord login rejection.
    #[serde(default)]
    pub username: Option<String>,
    /// Used instead of `detail` by the upload endpoints.
    #[serde(default)]
    pub error: Option<String>,
}

// =============================================================================
// ADMIN COMMANDS
// =============================================================================

/// A keyword argument value: `--key value` carries text, `--flag` is `true`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KwargValue {
    Text(String),
    Flag(bool),
}

/// A tokenized admin console line, posted verbatim to `/admin/command/`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub command: String,
    pub args: Vec<String>,
    pub kwargs: BTreeMap<String, KwargValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AvailableCommand {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailableCommands {
    pub available_commands: Vec<AvailableCommand>,
}

// =============================================================================
// PROFILE PICTURE
// =============================================================================

/// Largest accepted profile picture, in bytes.
pub const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

/// MIME type for an accepted picture file extension (JPEG, PNG or GIF).
#[must_use]
pub fn picture_mime(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Response of `POST /members/profile/picture/upload/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureUpload {
    #[serde(default)]
    pub message: String,
    pub url: String,
}

// =============================================================================
// REPORTS
// =============================================================================

/// What a report is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Interview,
    Question,
    Member,
}

impl std::str::FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interview" => Ok(Self::Interview),
            "question" => Ok(Self::Question),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown report type: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Resolving,
    Completed,
}

/// Body for `POST /reports/`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportBody {
    pub associated_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_user_id: Option<i64>,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_id: String,
    pub reporter: Member,
    pub status: ReportStatus,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub reason: String,
    pub created: String,
    pub updated: String,
    #[serde(default)]
    pub admin_id: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
    #[serde(default)]
    pub associated_id: Option<String>,
    /// The reported interview, question or member, shaped per `report_type`.
    #[serde(default)]
    pub associated_object: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportList {
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub reports: Vec<Report>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedReport {
    pub report: Report,
}

// =============================================================================
// ENGAGEMENT
// =============================================================================

/// An attendance check-in window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub session_id: String,
    /// RFC 3339 expiry.
    pub expires: String,
    #[serde(flatten)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl AttendanceSession {
    /// Whether the session is still open at `now`. An unparseable expiry
    /// reads as closed.
    #[must_use]
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        OffsetDateTime::parse(&self.expires, &Rfc3339).is_ok_and(|expires| expires > now)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active_at(OffsetDateTime::now_utc())
    }
}

/// One member's row in a Discord message-count query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageStats {
    pub member: Member,
    /// Per-channel counts and totals, keyed as the backend sends them.
    #[serde(flatten)]
    pub stats: BTreeMap<String, serde_json::Value>,
}

/// Coding-platform stats shown on a member profile.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(default)]
    pub github: Option<serde_json::Value>,
    #[serde(default)]
    pub leetcode: Option<serde_json::Value>,
}

// =============================================================================
// DESERIALIZERS
// =============================================================================

fn deserialize_null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Snowflakes arrive as JSON numbers from some endpoints and as strings from
/// others; accept both, plus `null`.
fn deserialize_optional_snowflake<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(number) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid snowflake: {number}"))),
        serde_json::Value::String(text) if text.is_empty() => Ok(None),
        serde_json::Value::String(text) => text
            .parse::<u64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid snowflake: {text}"))),
        other => Err(D::Error::custom(format!("expected snowflake, got {other}"))),
    }
}
