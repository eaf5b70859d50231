use serde::{Deserialize, Serialize};

use crate::normalize;

/// One night's sleep metrics for one user, as stored.
#[derive(Debug, Clone, Serialize)]
pub struct SleepLog {
    pub id: i64,
    pub user_id: i64,
    pub sleep_date: String,
    pub sleep_score: f64,
    pub bed_time: String,
    pub wakeup_time: String,
    pub sleep_duration: i64,
    pub wakeup_count: i64,
    pub deep_sleep_continuity: f64,
    pub deep_sleep_percentage: f64,
    pub light_sleep_percentage: f64,
    pub rem_sleep_percentage: f64,
    pub created_at: String,
}

/// A validated record ready for insertion.
#[derive(Debug, Clone)]
pub struct NewSleepLog {
    pub sleep_date: String,
    pub sleep_score: f64,
    pub bed_time: String,
    pub wakeup_time: String,
    pub sleep_duration: i64,
    pub wakeup_count: i64,
    pub deep_sleep_continuity: f64,
    pub deep_sleep_percentage: f64,
    pub light_sleep_percentage: f64,
    pub rem_sleep_percentage: f64,
}

fn nan() -> f64 {
    f64::NAN
}

/// A fully-normalized candidate record, before validation.
///
/// Numeric fields stay `f64` so `NaN` from the normalizer (and missing JSON
/// fields, which default to `NaN`) flow into validation instead of failing
/// during deserialization — the caller gets one message per broken field.
#[derive(Debug, Clone, Deserialize)]
pub struct SleepLogDraft {
    #[serde(default)]
    pub sleep_date: String,
    #[serde(default = "nan")]
    pub sleep_score: f64,
    #[serde(default)]
    pub bed_time: String,
    #[serde(default)]
    pub wakeup_time: String,
    #[serde(default = "nan")]
    pub sleep_duration: f64,
    #[serde(default = "nan")]
    pub wakeup_count: f64,
    #[serde(default = "nan")]
    pub deep_sleep_continuity: f64,
    #[serde(default = "nan")]
    pub deep_sleep_percentage: f64,
    #[serde(default = "nan")]
    pub light_sleep_percentage: f64,
    #[serde(default = "nan")]
    pub rem_sleep_percentage: f64,
}

impl SleepLogDraft {
    /// All-or-nothing conversion into a typed record: either every rule
    /// passes, or the full list of violations comes back.
    pub fn into_validated(self) -> Result<NewSleepLog, Vec<String>> {
        let violations = validate_sleep_log(&self);
        if !violations.is_empty() {
            return Err(violations);
        }
        Ok(NewSleepLog {
            sleep_date: self.sleep_date,
            sleep_score: self.sleep_score,
            bed_time: self.bed_time,
            wakeup_time: self.wakeup_time,
            sleep_duration: self.sleep_duration as i64,
            wakeup_count: self.wakeup_count as i64,
            deep_sleep_continuity: self.deep_sleep_continuity,
            deep_sleep_percentage: self.deep_sleep_percentage,
            light_sleep_percentage: self.light_sleep_percentage,
            rem_sleep_percentage: self.rem_sleep_percentage,
        })
    }
}

/// Validate a candidate record. Returns every violation, one message per
/// broken rule; an empty list means the record is valid.
///
/// The stage-percentage sum is checked with exact equality, no tolerance
/// band. Range checks are written so that `NaN` always fails them.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn validate_sleep_log(draft: &SleepLogDraft) -> Vec<String> {
    let mut violations = Vec::new();

    if !normalize::looks_like_date(&draft.sleep_date) {
        violations.push(format!(
            "sleep_date '{}' must be a valid YYYY-MM-DD date",
            draft.sleep_date
        ));
    }
    if !(draft.sleep_score >= 0.0 && draft.sleep_score <= 100.0) {
        violations.push("sleep_score must be a number between 0 and 100".to_string());
    }
    if !normalize::is_clock_time(&draft.bed_time) {
        violations.push(format!("bed_time '{}' must be HH:MM", draft.bed_time));
    }
    if !normalize::is_clock_time(&draft.wakeup_time) {
        violations.push(format!("wakeup_time '{}' must be HH:MM", draft.wakeup_time));
    }
    if !(draft.sleep_duration.fract() == 0.0 && draft.sleep_duration > 0.0) {
        violations.push("sleep_duration must be a positive integer number of minutes".to_string());
    }
    if !(draft.wakeup_count.fract() == 0.0 && draft.wakeup_count >= 0.0) {
        violations.push("wakeup_count must be a non-negative integer".to_string());
    }
    if !(draft.deep_sleep_continuity >= 0.0 && draft.deep_sleep_continuity <= 100.0) {
        violations.push("deep_sleep_continuity must be a number between 0 and 100".to_string());
    }
    let percentages = [
        ("deep_sleep_percentage", draft.deep_sleep_percentage),
        ("light_sleep_percentage", draft.light_sleep_percentage),
        ("rem_sleep_percentage", draft.rem_sleep_percentage),
    ];
    for (field, value) in percentages {
        if !(value >= 0.0 && value <= 100.0) {
            violations.push(format!("{field} must be a number between 0 and 100"));
        }
    }
    let sum =
        draft.deep_sleep_percentage + draft.light_sleep_percentage + draft.rem_sleep_percentage;
    if sum != 100.0 {
        violations.push(
            "deep_sleep_percentage, light_sleep_percentage and rem_sleep_percentage must sum to exactly 100"
                .to_string(),
        );
    }

    violations
}

/// An account that owns sleep logs.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_public: bool,
    pub created_at: String,
}

/// Outcome of one CSV import batch: counts plus per-row error messages in
/// file order. Never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
    pub messages: Vec<String>,
}
