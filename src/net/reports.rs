//! Content reports: members flag interviews, questions or other members and
//! admins review the queue.

#[cfg(test)]
#[path = "reports_test.rs"]
mod reports_test;

use reqwest::{Method, StatusCode};

use super::api::{ApiError, HttpApi, decode, rejection};
use super::types::{CreatedReport, Report, ReportBody, ReportList};

const REPORTS_PATH: &str = "/reports/";
const ALL_REPORTS_PATH: &str = "/reports/all/";

fn member_reports_path(member_id: i64) -> String {
    format!("/reports/users/{member_id}/")
}

fn report_path(report_id: &str) -> String {
    format!("/reports/{report_id}/")
}

/// Report endpoints. Enables mocking in tests.
#[async_trait::async_trait]
pub trait ReportApi: Send + Sync {
    /// File a report; the backend answers 201 with the stored report.
    async fn create_report(&self, body: &ReportBody) -> Result<Report, ApiError>;
    /// Reports filed by one member.
    async fn member_reports(&self, member_id: i64) -> Result<Vec<Report>, ApiError>;
    /// Every report (admin only).
    async fn all_reports(&self) -> Result<Vec<Report>, ApiError>;
    async fn report_detail(&self, report_id: &str) -> Result<Report, ApiError>;
}

#[async_trait::async_trait]
impl ReportApi for HttpApi {
    async fn create_report(&self, body: &ReportBody) -> Result<Report, ApiError> {
        let builder = self.request(Method::POST, REPORTS_PATH).await.json(body);
        let (status, text) = Self::execute(builder).await?;
        if status != StatusCode::CREATED {
            return Err(rejection(status.as_u16(), &text));
        }
        let created: CreatedReport = decode(&text)?;
        Ok(created.report)
    }

    async fn member_reports(&self, member_id: i64) -> Result<Vec<Report>, ApiError> {
        self.get_json(&member_reports_path(member_id)).await
    }

    async fn all_reports(&self) -> Result<Vec<Report>, ApiError> {
        let list: ReportList = self.get_json(ALL_REPORTS_PATH).await?;
        Ok(list.reports)
    }

    async fn report_detail(&self, report_id: &str) -> Result<Report, ApiError> {
        self.get_json(&report_path(report_id)).await
    }
}
