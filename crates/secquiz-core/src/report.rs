//! Admin report: aggregate statistics plus the attempt list, with JSON
//! persistence and markdown rendering.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QuizError;
use crate::model::AttemptSummary;
use crate::scoring::{percentage, statistics, AggregateStatistics};

/// A snapshot of recorded attempts for administrators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Set when the report covers one user only.
    #[serde(default)]
    pub user_filter: Option<String>,
    /// `None` when no attempt has been completed yet.
    pub statistics: Option<AggregateStatistics>,
    /// Attempts, newest first.
    pub attempts: Vec<AttemptSummary>,
}

impl AdminReport {
    /// Build a report from a recorder listing.
    pub fn new(user_filter: Option<String>, attempts: Vec<AttemptSummary>) -> Result<Self> {
        let statistics = match statistics(&attempts) {
            Ok(stats) => Some(stats),
            Err(QuizError::EmptyAttemptSet) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            user_filter,
            statistics,
            attempts,
        })
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: AdminReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    pub fn completed_attempts(&self) -> impl Iterator<Item = &AttemptSummary> {
        self.attempts.iter().filter(|a| a.completed_at.is_some())
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Security Quiz Report\n\n");
        md.push_str(&format!(
            "**Generated:** {}\n\n",
            self.created_at.format("%Y-%m-%d %H:%M UTC")
        ));
        if let Some(user) = &self.user_filter {
            md.push_str(&format!("**User:** {user}\n\n"));
        }

        let Some(stats) = &self.statistics else {
            md.push_str("No completed attempts yet.\n");
            return md;
        };

        md.push_str("## Summary\n\n");
        md.push_str("| Attempts | Passed | Failed | Average score | Pass rate |\n");
        md.push_str("|----------|--------|--------|---------------|-----------|\n");
        md.push_str(&format!(
            "| {} | {} | {} | {:.2} | {:.2}% |\n\n",
            stats.total_attempts,
            stats.passed_attempts,
            stats.failed_attempts,
            stats.average_score,
            stats.pass_rate
        ));

        md.push_str("## Attempts\n\n");
        md.push_str("| Started | User | Score | Result | Time |\n");
        md.push_str("|---------|------|-------|--------|------|\n");
        for a in &self.attempts {
            let (score, result) = if a.completed_at.is_some() {
                (
                    format!(
                        "{}/{} ({}%)",
                        a.score,
                        a.total_questions,
                        percentage(a.score, a.total_questions)
                    ),
                    if a.passed { "PASS" } else { "FAIL" },
                )
            } else {
                ("-".to_string(), "in progress")
            };
            let time = a
                .total_time_seconds
                .map(|s| format!("{}m {:02}s", s / 60, s % 60))
                .unwrap_or_else(|| "-".into());
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                a.started_at.format("%Y-%m-%d %H:%M"),
                a.user_id,
                score,
                result,
                time
            ));
        }

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(user: &str, score: u32, completed: bool) -> AttemptSummary {
        AttemptSummary {
            attempt_id: Uuid::new_v4(),
            user_id: user.into(),
            started_at: Utc::now(),
            completed_at: completed.then(Utc::now),
            score,
            total_questions: 15,
            passed: score >= 14,
            total_time_seconds: completed.then_some(185),
        }
    }

    #[test]
    fn empty_report_has_no_statistics() {
        let report = AdminReport::new(None, vec![attempt("a", 0, false)]).unwrap();
        assert!(report.statistics.is_none());
        assert!(report.to_markdown().contains("No completed attempts yet."));
    }

    #[test]
    fn markdown_lists_attempts() {
        let report = AdminReport::new(
            Some("alice".into()),
            vec![attempt("alice", 15, true), attempt("alice", 3, false)],
        )
        .unwrap();
        let md = report.to_markdown();
        assert!(md.contains("**User:** alice"));
        assert!(md.contains("| 1 | 1 | 0 | 15.00 | 100.00% |"));
        assert!(md.contains("15/15 (100%)"));
        assert!(md.contains("3m 05s"));
        assert!(md.contains("in progress"));
        assert_eq!(report.completed_attempts().count(), 1);
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/admin.json");
        let report = AdminReport::new(None, vec![attempt("bob", 14, true)]).unwrap();
        report.save_json(&path).unwrap();

        let loaded = AdminReport::load_json(&path).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.statistics, report.statistics);
        assert_eq!(loaded.attempts, report.attempts);
    }
}
