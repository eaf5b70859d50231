//! Dashboard aggregation — descriptive statistics, circular bed-time
//! averaging, trend slopes, and per-weekday grouping.
//!
//! Everything here is a pure function over records ordered by date
//! ascending; callers fetch via [`crate::db::Database::list_logs_ordered`]
//! and recompute on every request.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::models::SleepLog;
use crate::normalize::time_to_minutes;

/// Minimum, maximum and arithmetic mean of one metric.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl FieldStats {
    #[allow(clippy::cast_precision_loss)]
    fn over(values: &[f64]) -> Self {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            min,
            max,
            avg: mean(values),
        }
    }
}

/// Trend slopes for the metrics the dashboard charts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Trends {
    pub wakeup_count: f64,
    pub deep_sleep_continuity: f64,
    pub deep_sleep_percentage: f64,
    pub light_sleep_percentage: f64,
}

/// Descriptive statistics over a user's full history.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub sleep_score: FieldStats,
    pub sleep_duration: FieldStats,
    pub wakeup_count: FieldStats,
    pub deep_sleep_continuity: FieldStats,
    pub deep_sleep_percentage: FieldStats,
    pub light_sleep_percentage: FieldStats,
    pub rem_sleep_percentage: FieldStats,
    /// Mean bed time in folded minutes since midnight; values past 1440
    /// stand for bed times after midnight.
    pub avg_bed_time_min: f64,
    pub avg_wakeup_time_min: f64,
    pub trends: Trends,
}

/// Per-weekday averages, `0` = Sunday through `6` = Saturday.
#[derive(Debug, Clone, Serialize)]
pub struct WeekdayStats {
    pub day_of_week: u32,
    pub count: usize,
    pub avg_score: f64,
    pub avg_duration: f64,
    pub avg_wakeup_count: f64,
    pub avg_deep_sleep_continuity: f64,
    pub avg_deep_sleep_percentage: f64,
    pub avg_light_sleep_percentage: f64,
    pub avg_rem_sleep_percentage: f64,
    pub avg_bed_time_min: f64,
    pub avg_wakeup_time_min: f64,
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Bed times cluster around midnight, so averaging raw minutes would drag
/// 00:30 toward noon. Hours before 15:00 are treated as past-midnight and
/// shifted forward a day, putting 00:30 next to 23:45 on one continuous
/// scale. Wake times cluster in the morning and need no folding.
#[allow(clippy::cast_precision_loss)]
fn folded_bed_minutes(time: &str) -> Option<f64> {
    let minutes = time_to_minutes(time)?;
    if minutes < 15 * 60 {
        Some((minutes + 24 * 60) as f64)
    } else {
        Some(minutes as f64)
    }
}

#[allow(clippy::cast_precision_loss)]
fn wake_minutes(time: &str) -> Option<f64> {
    time_to_minutes(time).map(|m| m as f64)
}

/// Ordinary least-squares slope of `values` against x = 0..n-1. Fewer than
/// two points carry no trend.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn trend_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..n).map(|i| (i * i) as f64).sum();
    (n_f * sum_xy - sum_x * sum_y) / (n_f * sum_xx - sum_x * sum_x)
}

/// Compute the statistics view over records ordered by date ascending.
/// `None` when there is nothing to aggregate — callers report "no data"
/// instead of division artifacts.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_statistics(logs: &[SleepLog]) -> Option<Statistics> {
    if logs.is_empty() {
        return None;
    }

    let collect = |f: fn(&SleepLog) -> f64| -> Vec<f64> { logs.iter().map(f).collect() };
    let scores = collect(|l| l.sleep_score);
    let durations = collect(|l| l.sleep_duration as f64);
    let wakeup_counts = collect(|l| l.wakeup_count as f64);
    let continuities = collect(|l| l.deep_sleep_continuity);
    let deep = collect(|l| l.deep_sleep_percentage);
    let light = collect(|l| l.light_sleep_percentage);
    let rem = collect(|l| l.rem_sleep_percentage);

    let bed_minutes: Vec<f64> = logs
        .iter()
        .filter_map(|l| folded_bed_minutes(&l.bed_time))
        .collect();
    let wakeup_minutes: Vec<f64> = logs
        .iter()
        .filter_map(|l| wake_minutes(&l.wakeup_time))
        .collect();

    Some(Statistics {
        count: logs.len(),
        sleep_score: FieldStats::over(&scores),
        sleep_duration: FieldStats::over(&durations),
        wakeup_count: FieldStats::over(&wakeup_counts),
        deep_sleep_continuity: FieldStats::over(&continuities),
        deep_sleep_percentage: FieldStats::over(&deep),
        light_sleep_percentage: FieldStats::over(&light),
        rem_sleep_percentage: FieldStats::over(&rem),
        avg_bed_time_min: mean(&bed_minutes),
        avg_wakeup_time_min: mean(&wakeup_minutes),
        trends: Trends {
            wakeup_count: trend_slope(&wakeup_counts),
            deep_sleep_continuity: trend_slope(&continuities),
            deep_sleep_percentage: trend_slope(&deep),
            light_sleep_percentage: trend_slope(&light),
        },
    })
}

/// Group records by day of week and average every metric within each group.
/// Weekdays with no records are absent from the result; output is ordered
/// by weekday ascending.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_weekly(logs: &[SleepLog]) -> Vec<WeekdayStats> {
    let mut groups: [Vec<&SleepLog>; 7] = Default::default();
    for log in logs {
        if let Ok(date) = NaiveDate::parse_from_str(&log.sleep_date, "%Y-%m-%d") {
            groups[date.weekday().num_days_from_sunday() as usize].push(log);
        }
    }

    groups
        .iter()
        .enumerate()
        .filter(|(_, members)| !members.is_empty())
        .map(|(day, members)| {
            let avg = |f: fn(&SleepLog) -> f64| -> f64 {
                members.iter().copied().map(f).sum::<f64>() / members.len() as f64
            };
            let bed: Vec<f64> = members
                .iter()
                .filter_map(|l| folded_bed_minutes(&l.bed_time))
                .collect();
            let wake: Vec<f64> = members
                .iter()
                .filter_map(|l| wake_minutes(&l.wakeup_time))
                .collect();
            WeekdayStats {
                day_of_week: day as u32,
                count: members.len(),
                avg_score: avg(|l| l.sleep_score),
                avg_duration: avg(|l| l.sleep_duration as f64),
                avg_wakeup_count: avg(|l| l.wakeup_count as f64),
                avg_deep_sleep_continuity: avg(|l| l.deep_sleep_continuity),
                avg_deep_sleep_percentage: avg(|l| l.deep_sleep_percentage),
                avg_light_sleep_percentage: avg(|l| l.light_sleep_percentage),
                avg_rem_sleep_percentage: avg(|l| l.rem_sleep_percentage),
                avg_bed_time_min: mean(&bed),
                avg_wakeup_time_min: mean(&wake),
            }
        })
        .collect()
}

/// Render an averaged minute value as `HH:MM`, unfolding values past 24
/// hours back onto the clock.
#[must_use]
pub fn minutes_to_clock(minutes: f64) -> String {
    let total = (minutes.round() as i64).rem_euclid(24 * 60);
    format!("{:02}:{:02}", total / 60, total % 60)
}
