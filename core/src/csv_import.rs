//! CSV import pipeline and exporter.
//!
//! Two batch layouts are supported, as an explicit closed set: the
//! fixed-position bulk format (columns read strictly by position) and the
//! labeled format (columns located by header text, covering both the
//! Japanese watch-app export and hand-maintained spreadsheets). Rows are
//! processed strictly in file order — each row's duplicate check must see
//! the inserts made by earlier rows in the same batch.

use anyhow::{Context, Result, bail};

use crate::db::Database;
use crate::models::{ImportOutcome, SleepLog, SleepLogDraft};
use crate::normalize::{
    looks_like_date, normalize_clock_time, normalize_date, parse_number, parse_percentage,
    resolve_duration, strip_quotes_and_trim,
};

/// Accepted header labels per field, in priority order. The Japanese labels
/// come from the watch app's own export and the hand-edited data.csv
/// variant; the English names match the API column names.
const DATE_LABELS: &[&str] = &["日付", "sleep_date"];
const SCORE_LABELS: &[&str] = &["点数", "睡眠スコア", "sleep_score"];
const BED_LABELS: &[&str] = &["入眠時間", "就寝時間", "bed_time"];
const WAKE_LABELS: &[&str] = &["起床時間", "wakeup_time"];
const WAKEUP_COUNT_LABELS: &[&str] = &["目が覚めた回数", "中途覚醒回数", "wakeup_count"];
const CONTINUITY_LABELS: &[&str] = &["深い睡眠の持続性", "deep_sleep_continuity"];
const DEEP_LABELS: &[&str] = &["深い睡眠の割合", "深い睡眠割合", "deep_sleep_percentage"];
const LIGHT_LABELS: &[&str] = &["浅い睡眠の割合", "浅い睡眠割合", "light_sleep_percentage"];
const REM_LABELS: &[&str] = &["レム睡眠の割合", "レム睡眠割合", "rem_sleep_percentage"];
const DURATION_LABELS: &[&str] = &["睡眠時間", "sleep_duration"];

/// How column meaning is resolved for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Columns read strictly by position 0–9: date, score, bed time, wake
    /// time, wakeup count, continuity, duration, deep%, light%, rem%.
    Fixed,
    /// Column indexes resolved from header labels. This layout carries no
    /// duration column; the duration is derived from bed and wake times.
    Labeled(ColumnMap),
}

/// Resolved column indexes for the labeled layout. Only the date column is
/// required — a missing column reads as an empty cell and the validator
/// rejects the affected rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: usize,
    pub score: Option<usize>,
    pub bed_time: Option<usize>,
    pub wakeup_time: Option<usize>,
    pub wakeup_count: Option<usize>,
    pub continuity: Option<usize>,
    pub deep_pct: Option<usize>,
    pub light_pct: Option<usize>,
    pub rem_pct: Option<usize>,
}

impl ColumnMap {
    /// Resolve indexes from header labels, or `None` when no date-like
    /// column exists (meaning this is not a labeled header at all).
    fn resolve(headers: &[String]) -> Option<Self> {
        let date = find_column(headers, DATE_LABELS)?;
        Some(Self {
            date,
            score: find_column(headers, SCORE_LABELS),
            bed_time: find_column(headers, BED_LABELS),
            wakeup_time: find_column(headers, WAKE_LABELS),
            wakeup_count: find_column(headers, WAKEUP_COUNT_LABELS),
            continuity: find_column(headers, CONTINUITY_LABELS),
            deep_pct: find_column(headers, DEEP_LABELS),
            light_pct: find_column(headers, LIGHT_LABELS),
            rem_pct: find_column(headers, REM_LABELS),
        })
    }
}

/// Find a column for a field: an exact label match wins over substring
/// containment (so `深い睡眠の持続性(点数)` still resolves), and earlier
/// candidate labels win over later ones.
fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    for key in candidates {
        if let Some(idx) = headers.iter().position(|h| h.as_str() == *key) {
            return Some(idx);
        }
        if let Some(idx) = headers.iter().position(|h| h.contains(*key)) {
            return Some(idx);
        }
    }
    None
}

fn label_matches(header: &str, candidates: &[&str]) -> bool {
    candidates.iter().any(|key| header.contains(*key))
}

/// The fixed-position signature: at least the ten positional columns, a
/// date label up front and an explicit duration label at position 6. This
/// is the bulk-import format the exporter documentation describes.
fn is_fixed_header(headers: &[String]) -> bool {
    headers.len() >= 10
        && label_matches(&headers[0], DATE_LABELS)
        && label_matches(&headers[6], DURATION_LABELS)
}

/// Header/no-header fallback for files whose first line resolves no known
/// label. Heuristic: line 1 is data only when its first cell parses as a
/// date. Isolated here so it can be swapped for an explicit flag without
/// touching the pipeline.
fn leading_row_is_header(cells: &[String]) -> bool {
    let first = cells.first().map(|c| normalize_date(c)).unwrap_or_default();
    !looks_like_date(&first)
}

/// Decide how to read the batch: which layout, and whether line 1 is a
/// header to skip.
fn detect_layout(first_line: &str) -> (Layout, bool) {
    let headers = split_cells(first_line);
    if is_fixed_header(&headers) {
        return (Layout::Fixed, true);
    }
    if let Some(map) = ColumnMap::resolve(&headers) {
        return (Layout::Labeled(map), true);
    }
    (Layout::Fixed, leading_row_is_header(&headers))
}

fn split_cells(line: &str) -> Vec<String> {
    line.split(',').map(strip_quotes_and_trim).collect()
}

/// A cell by index; out-of-range or unresolved columns read as empty.
fn cell<'a>(cells: &'a [String], idx: Option<usize>) -> &'a str {
    idx.and_then(|i| cells.get(i)).map_or("", String::as_str)
}

/// Assemble a normalized candidate record from one row's cells.
#[allow(clippy::cast_precision_loss)]
fn draft_from_cells(cells: &[String], layout: &Layout) -> SleepLogDraft {
    let (date, score, bed, wake, count, continuity, duration, deep, light, rem) = match layout {
        Layout::Fixed => (
            cell(cells, Some(0)),
            cell(cells, Some(1)),
            cell(cells, Some(2)),
            cell(cells, Some(3)),
            cell(cells, Some(4)),
            cell(cells, Some(5)),
            cell(cells, Some(6)),
            cell(cells, Some(7)),
            cell(cells, Some(8)),
            cell(cells, Some(9)),
        ),
        Layout::Labeled(map) => (
            cell(cells, Some(map.date)),
            cell(cells, map.score),
            cell(cells, map.bed_time),
            cell(cells, map.wakeup_time),
            cell(cells, map.wakeup_count),
            cell(cells, map.continuity),
            "",
            cell(cells, map.deep_pct),
            cell(cells, map.light_pct),
            cell(cells, map.rem_pct),
        ),
    };

    let bed_time = normalize_clock_time(bed);
    let wakeup_time = normalize_clock_time(wake);
    let sleep_duration = resolve_duration(duration, &bed_time, &wakeup_time);

    SleepLogDraft {
        sleep_date: normalize_date(date),
        sleep_score: parse_number(score),
        bed_time,
        wakeup_time,
        sleep_duration: sleep_duration as f64,
        wakeup_count: parse_number(count),
        deep_sleep_continuity: parse_number(continuity),
        deep_sleep_percentage: parse_percentage(deep),
        light_sleep_percentage: parse_percentage(light),
        rem_sleep_percentage: parse_percentage(rem),
    }
}

/// Run a CSV batch against the store for one user.
///
/// Individual bad rows never abort the batch: they are counted and reported
/// in the outcome, tagged with their 1-based data-row number. Only
/// batch-level problems (empty input, store failures) surface as `Err`.
pub fn import_csv(db: &Database, user_id: i64, text: &str) -> Result<ImportOutcome> {
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.is_empty() {
        bail!("CSV input is empty");
    }

    let (layout, skip_first) = detect_layout(lines[0]);
    let data_lines = if skip_first { &lines[1..] } else { &lines[..] };

    let mut outcome = ImportOutcome::default();
    for (index, line) in data_lines.iter().enumerate() {
        let row_number = index + 1;
        let cells = split_cells(line);
        let draft = draft_from_cells(&cells, &layout);
        if draft.sleep_date.is_empty() {
            continue;
        }
        match draft.into_validated() {
            Err(violations) => {
                outcome.errors += 1;
                outcome
                    .messages
                    .push(format!("row {row_number}: {}", violations.join(", ")));
            }
            Ok(log) => {
                if db.find_log_id_by_date(user_id, &log.sleep_date, None)?.is_some() {
                    outcome.skipped += 1;
                } else {
                    db.insert_sleep_log(user_id, &log)
                        .with_context(|| format!("row {row_number}: insert failed"))?;
                    outcome.inserted += 1;
                }
            }
        }
    }

    Ok(outcome)
}

/// Header labels for the exporter. The duration column is omitted — it is
/// always derivable from the bed and wake columns on re-import.
const EXPORT_HEADER: [&str; 9] = [
    "日付",
    "睡眠スコア",
    "就寝時間",
    "起床時間",
    "中途覚醒回数",
    "深い睡眠の持続性",
    "深い睡眠割合",
    "浅い睡眠割合",
    "レム睡眠割合",
];

fn format_metric(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Render records (ordered by date ascending) as CSV text. An empty record
/// set yields the header row alone.
pub fn export_csv(logs: &[SleepLog]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER)?;
    for log in logs {
        writer.write_record(&[
            log.sleep_date.clone(),
            format_metric(log.sleep_score),
            log.bed_time.clone(),
            log.wakeup_time.clone(),
            log.wakeup_count.to_string(),
            format_metric(log.deep_sleep_continuity),
            format_metric(log.deep_sleep_percentage),
            format_metric(log.light_sleep_percentage),
            format_metric(log.rem_sleep_percentage),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV writer flush failed: {e}"))?;
    String::from_utf8(bytes).context("exported CSV was not valid UTF-8")
}
