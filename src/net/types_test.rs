use super::*;
use serde_json::json;

// =============================================================
// Member
// =============================================================

fn member_json() -> serde_json::Value {
    json!({
        "id": 42,
        "username": "alice",
        "created": "2024-09-01T12:00:00Z",
        "email": "alice@example.com",
        "role": "member",
        "first_name": "Alice",
        "last_name": "Liddell",
        "discord_username": "alice#0001",
        "discord_id": 123_456_789_012_345_678_u64,
        "github": { "username": "alice", "isPrivate": false },
        "groups": [{ "name": "is_verified" }]
    })
}

#[test]
fn member_deserializes_backend_payload() {
    let member: Member = serde_json::from_value(member_json()).unwrap();
    assert_eq!(member.id, 42);
    assert_eq!(member.first_name, "Alice");
    assert_eq!(member.discord_id, Some(123_456_789_012_345_678));
    assert_eq!(member.github.as_ref().map(|g| g.username.as_str()), Some("alice"));
    assert!(member.bio.is_none());
}

#[test]
fn member_group_flags_follow_group_names() {
    let member: Member = serde_json::from_value(member_json()).unwrap();
    assert!(member.is_verified());
    assert!(!member.is_admin());
}

#[test]
fn member_null_groups_means_no_roles() {
    let mut raw = member_json();
    raw["groups"] = serde_json::Value::Null;
    let member: Member = serde_json::from_value(raw).unwrap();
    assert!(member.groups.is_empty());
    assert!(!member.is_verified());
}

#[test]
fn member_discord_id_accepts_string_and_null() {
    let mut raw = member_json();
    raw["discord_id"] = json!("987654321");
    let member: Member = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(member.discord_id, Some(987_654_321));

    raw["discord_id"] = serde_json::Value::Null;
    let member: Member = serde_json::from_value(raw).unwrap();
    assert_eq!(member.discord_id, None);
}

#[test]
fn member_discord_id_rejects_garbage() {
    let mut raw = member_json();
    raw["discord_id"] = json!("not-a-number");
    assert!(serde_json::from_value::<Member>(raw).is_err());
}

#[test]
fn display_name_falls_back_to_username() {
    let mut member: Member = serde_json::from_value(member_json()).unwrap();
    assert_eq!(member.display_name(), "Alice Liddell");
    member.first_name.clear();
    member.last_name.clear();
    assert_eq!(member.display_name(), "alice");
}

// =============================================================
// Request bodies
// =============================================================

#[test]
fn member_update_omits_unset_fields() {
    let update = MemberUpdate { bio: Some("hi".to_owned()), ..MemberUpdate::default() };
    assert_eq!(serde_json::to_value(&update).unwrap(), json!({ "bio": "hi" }));
}

#[test]
fn registration_uses_snake_case_keys() {
    let form = Registration {
        first_name: "Ada".to_owned(),
        last_name: "Lovelace".to_owned(),
        username: "ada".to_owned(),
        email: "ada@example.com".to_owned(),
        password: "pw".to_owned(),
        discord_username: "ada".to_owned(),
    };
    let value = serde_json::to_value(&form).unwrap();
    assert_eq!(value["first_name"], "Ada");
    assert_eq!(value["discord_username"], "ada");
}

#[test]
fn auth_error_body_tolerates_missing_fields() {
    let body: AuthErrorBody = serde_json::from_str("{}").unwrap();
    assert_eq!(body, AuthErrorBody::default());
}

// =============================================================
// Admin commands
// =============================================================

#[test]
fn parsed_command_serializes_kwargs_as_strings_and_bools() {
    let mut cmd = ParsedCommand { command: "sync".to_owned(), ..ParsedCommand::default() };
    cmd.kwargs.insert("dry-run".to_owned(), KwargValue::Flag(true));
    cmd.kwargs.insert("limit".to_owned(), KwargValue::Text("10".to_owned()));
    assert_eq!(
        serde_json::to_value(&cmd).unwrap(),
        json!({ "command": "sync", "args": [], "kwargs": { "dry-run": true, "limit": "10" } })
    );
}

#[test]
fn command_response_defaults_absent_fields() {
    let resp: CommandResponse = serde_json::from_str(r#"{"output":"ok"}"#).unwrap();
    assert_eq!(resp.output.as_deref(), Some("ok"));
    assert!(resp.error.is_none());
    assert!(resp.success.is_none());
}

// =============================================================
// Profile picture
// =============================================================

#[test]
fn picture_mime_accepts_jpeg_png_and_gif_only() {
    assert_eq!(picture_mime("me.JPG"), Some("image/jpeg"));
    assert_eq!(picture_mime("me.jpeg"), Some("image/jpeg"));
    assert_eq!(picture_mime("me.png"), Some("image/png"));
    assert_eq!(picture_mime("anim.gif"), Some("image/gif"));
    assert_eq!(picture_mime("me.webp"), None);
    assert_eq!(picture_mime("noextension"), None);
}

// =============================================================
// Reports
// =============================================================

#[test]
fn report_type_parses_case_insensitively() {
    assert_eq!("Interview".parse::<ReportType>(), Ok(ReportType::Interview));
    assert_eq!(" member ".parse::<ReportType>(), Ok(ReportType::Member));
    assert!("spam".parse::<ReportType>().is_err());
}

#[test]
fn report_body_sends_type_key_and_omits_missing_reporter() {
    let body = ReportBody {
        associated_id: "q-1".to_owned(),
        reporter_user_id: None,
        report_type: ReportType::Question,
        reason: "duplicate".to_owned(),
    };
    assert_eq!(
        serde_json::to_value(&body).unwrap(),
        json!({ "associated_id": "q-1", "type": "question", "reason": "duplicate" })
    );
}

#[test]
fn report_decodes_with_optional_admin_fields_absent() {
    let report: Report = serde_json::from_value(json!({
        "report_id": "r-1",
        "reporter": member_json(),
        "status": "resolving",
        "type": "member",
        "reason": "spam",
        "created": "2024-09-01T12:00:00Z",
        "updated": "2024-09-02T12:00:00Z",
    }))
    .unwrap();
    assert_eq!(report.status, ReportStatus::Resolving);
    assert_eq!(report.report_type, ReportType::Member);
    assert_eq!(report.reporter.id, 42);
    assert!(report.admin_notes.is_none());
    assert!(report.associated_object.is_none());
}

#[test]
fn report_list_treats_null_as_empty() {
    let list: ReportList = serde_json::from_str(r#"{"reports":null}"#).unwrap();
    assert!(list.reports.is_empty());
}

// =============================================================
// Engagement
// =============================================================

fn attendance(expires: &str) -> AttendanceSession {
    serde_json::from_value(json!({ "session_id": "s-1", "expires": expires, "title": "Workshop" })).unwrap()
}

#[test]
fn attendance_session_keeps_extra_fields() {
    let session = attendance("2024-09-01T12:00:00Z");
    assert_eq!(session.details.get("title"), Some(&json!("Workshop")));
}

#[test]
fn attendance_session_is_active_until_expiry() {
    let now = OffsetDateTime::parse("2024-09-01T12:00:00Z", &Rfc3339).unwrap();
    assert!(attendance("2024-09-01T12:00:01Z").is_active_at(now));
    assert!(!attendance("2024-09-01T12:00:00Z").is_active_at(now));
    assert!(!attendance("2024-09-01T11:00:00+00:00").is_active_at(now));
}

#[test]
fn attendance_session_with_bad_expiry_is_closed() {
    let now = OffsetDateTime::parse("2024-09-01T12:00:00Z", &Rfc3339).unwrap();
    assert!(!attendance("next tuesday").is_active_at(now));
}

#[test]
fn message_stats_flattens_counts_beside_member() {
    let row: MessageStats = serde_json::from_value(json!({
        "member": member_json(),
        "general": 12,
        "total": 15,
    }))
    .unwrap();
    assert_eq!(row.member.username, "alice");
    assert_eq!(row.stats.get("total"), Some(&json!(15)));
    assert!(!row.stats.contains_key("member"));
}

#[test]
fn user_stats_tolerates_missing_platforms() {
    let stats: UserStats = serde_json::from_str(r#"{"github":{"commits":3}}"#).unwrap();
    assert_eq!(stats.github, Some(json!({ "commits": 3 })));
    assert!(stats.leetcode.is_none());
}
