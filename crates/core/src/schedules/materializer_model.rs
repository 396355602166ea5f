use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::constants::{JOB_RUN_MESSAGE_MAX_CHARS, JOB_RUN_MESSAGE_MAX_DETAILS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunScope {
    Savings,
    Loan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailReason {
    InsertedAutoDca,
    AlreadyExistsAutoDca,
    InsertedAutoLoan,
    AlreadyExistsAutoLoan,
    InvalidConfiguration,
}

/// One due occurrence examined by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetail {
    pub scope: RunScope,
    pub reason: DetailReason,
    pub asset_id: i64,
    pub asset_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_id: Option<i64>,
    pub value_date: NaiveDate,
    pub period: String,
    /// Existing event that made the occurrence a no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one materializer pass over an as-of date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterializeReport {
    pub run_date: Option<NaiveDate>,
    /// Events written (a transfer pair counts two).
    pub inserted: usize,
    /// Occurrences that already existed.
    pub skipped: usize,
    /// Obligations whose configuration could not be used.
    pub failed: usize,
    pub details: Vec<RunDetail>,
}

impl MaterializeReport {
    /// Compact JSON summary stored on the job run.
    pub fn summary_message(&self, error: Option<&str>) -> String {
        let head: Vec<&RunDetail> = self.details.iter().take(JOB_RUN_MESSAGE_MAX_DETAILS).collect();
        let mut summary = json!({
            "stats": {
                "inserted": self.inserted,
                "skipped": self.skipped,
                "failed": self.failed,
            },
            "details": head,
        });
        if let (Some(err), Some(obj)) = (error, summary.as_object_mut()) {
            obj.insert("error".to_string(), json!(err));
        }
        truncate_chars(&summary.to_string(), JOB_RUN_MESSAGE_MAX_CHARS)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(day: u32) -> RunDetail {
        RunDetail {
            scope: RunScope::Savings,
            reason: DetailReason::InsertedAutoDca,
            asset_id: 1,
            asset_label: "Livret Épargne".to_string(),
            loan_id: None,
            value_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            period: "2024-01".to_string(),
            event_id: None,
            error: None,
        }
    }

    #[test]
    fn summary_is_capped_in_length() {
        let report = MaterializeReport {
            run_date: NaiveDate::from_ymd_opt(2024, 1, 31),
            inserted: 31,
            skipped: 0,
            failed: 0,
            details: (1..=31).map(detail).collect(),
        };
        let message = report.summary_message(None);
        assert_eq!(message.chars().count(), JOB_RUN_MESSAGE_MAX_CHARS);
        assert!(message.starts_with('{'));
    }

    #[test]
    fn short_summary_is_valid_json_with_error() {
        let report = MaterializeReport::default();
        let message = report.summary_message(Some("database is locked"));
        let parsed: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(parsed["error"], "database is locked");
        assert_eq!(parsed["stats"]["inserted"], 0);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
