use serde::{Deserialize, Serialize};

use super::Status;

/// Result of one evaluated prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub section_path: String,
    pub question: String,
    pub expected: String,
    pub actual: String,
    pub status: Status,
    #[serde(default)]
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_prompt: Option<String>,
    /// 1-based prompt position, used in dump file names.
    pub prompt_index: usize,
    #[serde(default)]
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of results.
    pub total_prompts: usize,
    pub pass_count: usize,
    pub warn_count: usize,
    pub fail_count: usize,
    /// Prompts excluded by `skip` plus results marked SKIP.
    pub skip_count: usize,
    /// PASS over non-SKIP results, in percent. `0` when nothing was evaluated.
    pub pass_rate: f64,
}

/// Aggregated checklist outcome for one story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub story_number: String,
    pub story_title: String,
    pub results: Vec<ValidationResult>,
    pub summary: Summary,
}

impl Report {
    /// Build a report; results are stably sorted by section path so the
    /// outcome does not depend on evaluation order.
    pub fn new(
        story_number: impl Into<String>,
        story_title: impl Into<String>,
        mut results: Vec<ValidationResult>,
        skipped_prompts: usize,
    ) -> Self {
        results.sort_by(|a, b| a.section_path.cmp(&b.section_path));
        let summary = Summary::of(&results, skipped_prompts);
        Self {
            story_number: story_number.into(),
            story_title: story_title.into(),
            results,
            summary,
        }
    }

    pub fn overall_status(&self) -> &'static str {
        if self.summary.fail_count > 0 {
            "NEEDS ATTENTION"
        } else if self.summary.warn_count > 0 {
            "ACCEPTABLE WITH WARNINGS"
        } else {
            "PASSED"
        }
    }

    /// No FAIL results (warnings are acceptable).
    pub fn all_passed(&self) -> bool {
        self.summary.fail_count == 0
    }

    pub fn failed(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.status == Status::Fail)
    }
}

impl Summary {
    fn of(results: &[ValidationResult], skipped_prompts: usize) -> Self {
        let count = |s: Status| results.iter().filter(|r| r.status == s).count();
        let pass_count = count(Status::Pass);
        let skipped_results = count(Status::Skip);
        let evaluated = results.len() - skipped_results;
        let pass_rate = if evaluated == 0 {
            0.0
        } else {
            pass_count as f64 / evaluated as f64 * 100.0
        };
        Self {
            total_prompts: results.len(),
            pass_count,
            warn_count: count(Status::Warn),
            fail_count: count(Status::Fail),
            skip_count: skipped_prompts + skipped_results,
            pass_rate,
        }
    }
}

#[cfg(test)]
pub(crate) fn result(path: &str, status: Status) -> ValidationResult {
    ValidationResult {
        section_path: path.to_string(),
        question: format!("question for {path}?"),
        expected: "yes".into(),
        actual: match status {
            Status::Pass => "yes".into(),
            _ => "no".into(),
        },
        status,
        rationale: String::new(),
        fix_prompt: None,
        prompt_index: 1,
        docs: Vec::new(),
    }
}
