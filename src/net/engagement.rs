//! Engagement data: attendance sessions, Discord message counts and
//! coding-platform stats.
//!
//! DESIGN
//! ======
//! The admin dashboard takes member and channel ids as comma-separated text;
//! [`parse_member_ids`] and [`parse_channel_ids`] drop blanks and, for member
//! ids, anything that is not a number.

#[cfg(test)]
#[path = "engagement_test.rs"]
mod engagement_test;

use reqwest::{Method, StatusCode};

use super::api::{ApiError, HttpApi, decode, rejection};
use super::types::{AttendanceSession, MessageStats, UserStats};

const ATTENDANCE_PATH: &str = "/engagement/attendance/";
const MESSAGE_QUERY_PATH: &str = "/engagement/message/query/";
const USER_STATS_PATH: &str = "/engagement/user/";

fn user_stats_path(member_id: Option<i64>) -> String {
    match member_id {
        Some(id) => format!("{USER_STATS_PATH}{id}"),
        None => USER_STATS_PATH.to_owned(),
    }
}

#[must_use]
pub fn parse_member_ids(input: &str) -> Vec<i64> {
    input.split(',').filter_map(|id| id.trim().parse().ok()).collect()
}

#[must_use]
pub fn parse_channel_ids(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Engagement endpoints. Enables mocking in tests.
#[async_trait::async_trait]
pub trait EngagementApi: Send + Sync {
    async fn attendance_sessions(&self) -> Result<Vec<AttendanceSession>, ApiError>;
    /// Message counts filtered by member and channel; empty filters match all.
    async fn message_stats(&self, member_ids: &[i64], channel_ids: &[String]) -> Result<Vec<MessageStats>, ApiError>;
    /// Stats for `member_id`, or for the caller when `None`.
    async fn user_stats(&self, member_id: Option<i64>) -> Result<UserStats, ApiError>;
}

#[async_trait::async_trait]
impl EngagementApi for HttpApi {
    async fn attendance_sessions(&self) -> Result<Vec<AttendanceSession>, ApiError> {
        self.get_json(ATTENDANCE_PATH).await
    }

    async fn message_stats(&self, member_ids: &[i64], channel_ids: &[String]) -> Result<Vec<MessageStats>, ApiError> {
        let query: Vec<(&str, String)> = member_ids
            .iter()
            .map(|id| ("member_id", id.to_string()))
            .chain(channel_ids.iter().map(|id| ("channel_id", id.clone())))
            .collect();
        let builder = self.request(Method::GET, MESSAGE_QUERY_PATH).await.query(&query);
        let (status, body) = Self::execute(builder).await?;
        if status != StatusCode::OK {
            return Err(rejection(status.as_u16(), &body));
        }
        decode(&body)
    }

    async fn user_stats(&self, member_id: Option<i64>) -> Result<UserStats, ApiError> {
        self.get_json(&user_stats_path(member_id)).await
    }
}
