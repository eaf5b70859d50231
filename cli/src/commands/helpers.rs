use anyhow::{Context, Result};
use chrono::Local;

use doze_core::db::Database;
use doze_core::models::User;

/// Parse a date argument: `YYYY-MM-DD`, `today`, or `yesterday`.
/// `None` defaults to today.
pub(crate) fn parse_date(date: Option<&str>) -> Result<String> {
    let today = Local::now().date_naive();
    let date = match date {
        None | Some("today") => today,
        Some("yesterday") => today - chrono::Duration::days(1),
        Some(s) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD"))?,
    };
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Resolve the local account CLI commands operate on, creating it on first
/// use. Accounts created this way have no password and cannot log in over
/// the API until one is set with `doze user add`.
pub(crate) fn resolve_cli_user(db: &Database, username: &str) -> Result<User> {
    if let Some(user) = db.get_user_by_username(username)? {
        return Ok(user);
    }
    db.create_user(username, "")
        .with_context(|| format!("Failed to create local user '{username}'"))
}

/// Render a duration in minutes as `7h 30m`.
pub(crate) fn format_duration(minutes: i64) -> String {
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}
