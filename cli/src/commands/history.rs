use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use doze_core::db::Database;
use doze_core::models::User;

use super::helpers::format_duration;

pub(crate) fn cmd_history(db: &Database, user: &User, limit: i64, json: bool) -> Result<()> {
    let logs = db.list_logs_page(user.id, limit, 0)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }

    if logs.is_empty() {
        eprintln!("No entries yet. Log one with `doze log`.");
        process::exit(2);
    }

    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Score")]
        score: String,
        #[tabled(rename = "Bed")]
        bed: String,
        #[tabled(rename = "Wake")]
        wake: String,
        #[tabled(rename = "Slept")]
        slept: String,
        #[tabled(rename = "Wakeups")]
        wakeups: i64,
        #[tabled(rename = "Deep/Light/REM")]
        stages: String,
    }

    let rows: Vec<HistoryRow> = logs
        .iter()
        .map(|l| HistoryRow {
            id: l.id,
            date: l.sleep_date.clone(),
            score: format!("{:.0}", l.sleep_score),
            bed: l.bed_time.clone(),
            wake: l.wakeup_time.clone(),
            slept: format_duration(l.sleep_duration),
            wakeups: l.wakeup_count,
            stages: format!(
                "{:.0}/{:.0}/{:.0}%",
                l.deep_sleep_percentage, l.light_sleep_percentage, l.rem_sleep_percentage
            ),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
