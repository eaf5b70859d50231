use anyhow::{Result, bail};

use doze_core::db::Database;
use doze_core::models::{SleepLogDraft, User};
use doze_core::normalize::{normalize_clock_time, normalize_date, resolve_duration};

use super::helpers::{format_duration, parse_date};

/// Record one night. Times accept `H:MM` or `HH:MM`; the duration may be
/// given explicitly (minutes or `H:MM`) or left to be derived from the
/// bed/wake interval.
#[allow(clippy::too_many_arguments, clippy::cast_precision_loss)]
pub(crate) fn cmd_log(
    db: &Database,
    user: &User,
    date: Option<&str>,
    score: f64,
    bed: &str,
    wake: &str,
    duration: Option<&str>,
    wakeups: i64,
    continuity: f64,
    deep: f64,
    light: f64,
    rem: f64,
    json: bool,
) -> Result<()> {
    let sleep_date = normalize_date(&parse_date(date)?);
    let bed_time = normalize_clock_time(bed);
    let wakeup_time = normalize_clock_time(wake);
    let sleep_duration = resolve_duration(duration.unwrap_or(""), &bed_time, &wakeup_time);

    let draft = SleepLogDraft {
        sleep_date,
        sleep_score: score,
        bed_time,
        wakeup_time,
        sleep_duration: sleep_duration as f64,
        wakeup_count: wakeups as f64,
        deep_sleep_continuity: continuity,
        deep_sleep_percentage: deep,
        light_sleep_percentage: light,
        rem_sleep_percentage: rem,
    };
    let log = match draft.into_validated() {
        Ok(log) => log,
        Err(violations) => bail!("Invalid entry:\n  {}", violations.join("\n  ")),
    };

    if db.find_log_id_by_date(user.id, &log.sleep_date, None)?.is_some() {
        bail!(
            "An entry for {} already exists (delete it first to replace it)",
            log.sleep_date
        );
    }

    let created = db.insert_sleep_log(user.id, &log)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
        return Ok(());
    }

    let date = &created.sleep_date;
    let score = created.sleep_score;
    let duration = format_duration(created.sleep_duration);
    println!("[{}] {date} — score {score:.0}, slept {duration}", created.id);
    Ok(())
}

pub(crate) fn cmd_delete(db: &Database, user: &User, id: i64, json: bool) -> Result<()> {
    if !db.delete_sleep_log(user.id, id)? {
        bail!("Sleep log {id} not found");
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted entry {id}");
    }
    Ok(())
}
