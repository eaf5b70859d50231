use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use doze_core::db::Database;
use doze_core::models::User;
use doze_core::stats::{FieldStats, compute_statistics, compute_weekly, minutes_to_clock};

use super::helpers::format_duration;

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "Trend/night")]
    trend: String,
}

fn row(metric: &'static str, stats: FieldStats, trend: Option<f64>) -> StatsRow {
    StatsRow {
        metric,
        min: format!("{:.0}", stats.min),
        max: format!("{:.0}", stats.max),
        avg: format!("{:.1}", stats.avg),
        trend: trend.map_or(String::from("—"), |t| format!("{t:+.3}")),
    }
}

pub(crate) fn cmd_stats(db: &Database, user: &User, json: bool) -> Result<()> {
    let logs = db.list_logs_ordered(user.id)?;
    let stats = compute_statistics(&logs);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let Some(stats) = stats else {
        eprintln!("No entries yet. Log one with `doze log`.");
        process::exit(2);
    };

    let count = stats.count;
    println!("=== {count} nights ===\n");

    let rows = vec![
        row("Score", stats.sleep_score, None),
        row("Duration (min)", stats.sleep_duration, None),
        row("Wakeups", stats.wakeup_count, Some(stats.trends.wakeup_count)),
        row(
            "Deep sleep continuity",
            stats.deep_sleep_continuity,
            Some(stats.trends.deep_sleep_continuity),
        ),
        row(
            "Deep sleep %",
            stats.deep_sleep_percentage,
            Some(stats.trends.deep_sleep_percentage),
        ),
        row(
            "Light sleep %",
            stats.light_sleep_percentage,
            Some(stats.trends.light_sleep_percentage),
        ),
        row("REM sleep %", stats.rem_sleep_percentage, None),
    ];

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let bed = minutes_to_clock(stats.avg_bed_time_min);
    let wake = minutes_to_clock(stats.avg_wakeup_time_min);
    println!("\n  Typical night: bed {bed}, wake {wake}");

    Ok(())
}

pub(crate) fn cmd_weekly(db: &Database, user: &User, json: bool) -> Result<()> {
    let logs = db.list_logs_ordered(user.id)?;
    let weekly = compute_weekly(&logs);

    if json {
        println!("{}", serde_json::to_string_pretty(&weekly)?);
        return Ok(());
    }

    if weekly.is_empty() {
        eprintln!("No entries yet. Log one with `doze log`.");
        process::exit(2);
    }

    #[derive(Tabled)]
    struct WeeklyRow {
        #[tabled(rename = "Day")]
        day: &'static str,
        #[tabled(rename = "Nights")]
        nights: usize,
        #[tabled(rename = "Score")]
        score: String,
        #[tabled(rename = "Slept")]
        slept: String,
        #[tabled(rename = "Bed")]
        bed: String,
        #[tabled(rename = "Wake")]
        wake: String,
        #[tabled(rename = "Deep/Light/REM")]
        stages: String,
    }

    let rows: Vec<WeeklyRow> = weekly
        .iter()
        .map(|w| WeeklyRow {
            day: DAY_NAMES[w.day_of_week as usize],
            nights: w.count,
            score: format!("{:.0}", w.avg_score),
            slept: format_duration(w.avg_duration.round() as i64),
            bed: minutes_to_clock(w.avg_bed_time_min),
            wake: minutes_to_clock(w.avg_wakeup_time_min),
            stages: format!(
                "{:.0}/{:.0}/{:.0}%",
                w.avg_deep_sleep_percentage, w.avg_light_sleep_percentage, w.avg_rem_sleep_percentage
            ),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
