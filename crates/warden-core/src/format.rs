//! Human-readable rendering of approval records.
//!
//! Used by the CLI and by chat integrations. Everything here is pure: the
//! caller passes `now` so output is deterministic.

use chrono::{DateTime, Utc};

use crate::persistence::types::{ApprovalRecord, ApprovalStatus};

/// Time left until `expires_at`, e.g. `"45 min"`, `"1 hour"`, `"expired"`.
///
/// Minutes round up, so a window with 30 seconds left still reads `"1 min"`.
/// From one hour on, the value is rounded to the nearest hour.
pub fn format_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = (expires_at - now).num_seconds();
    if remaining <= 0 {
        return "expired".to_string();
    }

    let minutes = (remaining + 59) / 60;
    if minutes < 60 {
        return format!("{minutes} min");
    }

    let hours = (minutes + 30) / 60;
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{hours} hours")
    }
}

/// One-line summary, e.g. `[ABC234] pending  Restart web (expires in 2 hours)`.
pub fn format_status_line(record: &ApprovalRecord, now: DateTime<Utc>) -> String {
    let mut line = format!("[{}] {:<8} {}", record.id, record.status, record.summary);
    if record.status == ApprovalStatus::Pending {
        let left = format_expiry(record.expires_at, now);
        if left == "expired" {
            line.push_str(" (expired)");
        } else {
            line.push_str(&format!(" (expires in {left})"));
        }
    }
    line
}

/// Message asking a human to approve or deny `record`.
pub fn format_approval_request(record: &ApprovalRecord, now: DateTime<Utc>) -> String {
    let mut out = format!("Approval needed: {}\n", record.summary);

    if let Some(details) = record.details.as_deref().filter(|d| !d.trim().is_empty()) {
        out.push('\n');
        out.push_str(details.trim());
        out.push('\n');
    }

    out.push_str("\nCommands:\n");
    for (i, command) in record.commands.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, command));
    }

    out.push_str(&format!("\nID: {}\n", record.id));
    out.push_str(&format!(
        "Reply \"approve {id}\" or \"deny {id}\".",
        id = record.id
    ));

    match format_expiry(record.expires_at, now).as_str() {
        "expired" => out.push_str(" This request has expired."),
        left => out.push_str(&format!(" Expires in {left}.")),
    }

    out
}

/// Outcome of an executed record: heading, then output, then errors.
pub fn format_execution_report(record: &ApprovalRecord) -> String {
    let heading = match record.status {
        ApprovalStatus::Executed => "completed",
        ApprovalStatus::Partial => "partially completed",
        ApprovalStatus::Failed => "failed",
        other => other.as_str(),
    };
    let mut out = format!("Approval {} {}: {}", record.id, heading, record.summary);

    if let Some(result) = record.result.as_deref() {
        out.push_str("\n\n");
        out.push_str(result);
    }
    if let Some(error) = record.error.as_deref() {
        out.push_str("\n\nErrors:\n");
        out.push_str(error);
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn record(ttl: Duration) -> ApprovalRecord {
        ApprovalRecord::new(
            "ABC234",
            "Restart web",
            vec!["systemctl restart nginx".to_string(), "echo done".to_string()],
            at(),
            ttl,
        )
    }

    #[test]
    fn expiry_buckets() {
        let now = at();
        assert_eq!(format_expiry(now, now), "expired");
        assert_eq!(format_expiry(now - Duration::minutes(5), now), "expired");
        assert_eq!(format_expiry(now + Duration::seconds(30), now), "1 min");
        assert_eq!(format_expiry(now + Duration::minutes(45), now), "45 min");
        assert_eq!(format_expiry(now + Duration::seconds(59 * 60 + 1), now), "1 hour");
        assert_eq!(format_expiry(now + Duration::minutes(80), now), "1 hour");
        assert_eq!(format_expiry(now + Duration::minutes(100), now), "2 hours");
        assert_eq!(format_expiry(now + Duration::hours(2), now), "2 hours");
    }

    #[test]
    fn status_line_shows_time_left_only_for_pending() {
        let mut r = record(Duration::hours(2));
        assert_eq!(
            format_status_line(&r, at()),
            "[ABC234] pending  Restart web (expires in 2 hours)"
        );
        assert!(format_status_line(&r, at() + Duration::hours(3)).ends_with("(expired)"));

        r.status = ApprovalStatus::Denied;
        assert_eq!(format_status_line(&r, at()), "[ABC234] denied   Restart web");
    }

    #[test]
    fn approval_request_carries_id_commands_and_expiry() {
        let mut r = record(Duration::minutes(45));
        r.details = Some("nginx stopped answering".to_string());

        let msg = format_approval_request(&r, at());
        assert!(msg.starts_with("Approval needed: Restart web\n"));
        assert!(msg.contains("nginx stopped answering"));
        assert!(msg.contains("  1. systemctl restart nginx\n"));
        assert!(msg.contains("  2. echo done\n"));
        assert!(msg.contains("ID: ABC234"));
        assert!(msg.contains("\"approve ABC234\""));
        assert!(msg.contains("\"deny ABC234\""));
        assert!(msg.ends_with("Expires in 45 min."));
    }

    #[test]
    fn approval_request_for_expired_record() {
        let r = record(Duration::minutes(10));
        let msg = format_approval_request(&r, at() + Duration::hours(1));
        assert!(msg.ends_with("This request has expired."));
        assert!(!msg.contains("\n\nnginx"));
    }

    #[test]
    fn execution_report_lists_output_then_errors() {
        let mut r = record(Duration::hours(2));
        r.status = ApprovalStatus::Partial;
        r.result = Some("$ echo done\ndone".to_string());
        r.error = Some("$ systemctl restart nginx\nERROR: command exited with code 1".to_string());

        let report = format_execution_report(&r);
        assert_eq!(
            report,
            "Approval ABC234 partially completed: Restart web\n\n\
             $ echo done\ndone\n\n\
             Errors:\n$ systemctl restart nginx\nERROR: command exited with code 1"
        );
    }

    #[test]
    fn execution_report_without_output() {
        let mut r = record(Duration::hours(2));
        r.status = ApprovalStatus::Approved;
        assert_eq!(format_execution_report(&r), "Approval ABC234 approved: Restart web");
    }
}
