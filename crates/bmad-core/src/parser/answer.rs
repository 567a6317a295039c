//! Checklist answer parsing and comparison against the expected answer.

use std::sync::OnceLock;

use regex::Regex;

use super::kv::split_kv;
use crate::checklist::Status;
use crate::error::{Error, Result};

/// Percentage points below a `>=N%` target that still count as WARN.
const WARN_THRESHOLD_PCT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub status: Status,
    pub actual: String,
    pub rationale: Option<String>,
}

/// Interpret a model reply to one checklist question.
///
/// An explicit `status: PASS|WARN|FAIL` line is trusted as-is (with
/// optional `answer:` and `rationale:` lines). Otherwise the `answer:`
/// (or `actual:`) value, else the first non-empty line, is compared to
/// `expected`.
pub fn judge(response: &str, expected: &str, ac_count: usize) -> Result<Judgement> {
    let mut status = None;
    let mut answer = None;
    let mut rationale = None;
    for line in response.lines() {
        let Some((key, value)) = split_kv(line.trim()) else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "status" if status.is_none() => status = parse_status(value),
            "answer" | "actual" if answer.is_none() => answer = Some(value.to_string()),
            "rationale" if rationale.is_none() => {
                rationale = Some(value.to_string()).filter(|r| !r.is_empty())
            }
            _ => {}
        }
    }

    if let Some(status) = status {
        return Ok(Judgement {
            status,
            actual: answer.unwrap_or_else(|| status.as_str().to_string()),
            rationale,
        });
    }

    let actual = match answer {
        Some(answer) => answer,
        None => response
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| Error::parse("empty checklist answer"))?
            .to_string(),
    };
    Ok(Judgement {
        status: compare(expected, &actual, ac_count),
        actual,
        rationale,
    })
}

fn parse_status(value: &str) -> Option<Status> {
    match value.to_ascii_uppercase().as_str() {
        "PASS" => Some(Status::Pass),
        "WARN" => Some(Status::Warn),
        "FAIL" => Some(Status::Fail),
        _ => None,
    }
}

static NUM_RE: OnceLock<Regex> = OnceLock::new();

fn first_number(s: &str) -> Option<i64> {
    NUM_RE
        .get_or_init(|| Regex::new(r"\d+").unwrap())
        .find(s)
        .and_then(|m| m.as_str().parse().ok())
}

fn exact_number(s: &str) -> Option<i64> {
    s.trim().parse().ok()
}

/// Compare an actual answer to the expected one.
pub fn compare(expected: &str, actual: &str, ac_count: usize) -> Status {
    let expected = expected.trim().to_lowercase();
    let actual = actual.trim().to_lowercase();

    if expected.contains("total") && expected.contains("ac") {
        return match exact_number(&actual) {
            Some(n) if n == ac_count as i64 => Status::Pass,
            _ => Status::Fail,
        };
    }
    if expected.contains('%') {
        return compare_percentage(&expected, &actual);
    }
    if let Some(rest) = expected
        .strip_prefix(">=")
        .or_else(|| expected.strip_prefix('≥'))
    {
        return match (first_number(rest), exact_number(&actual)) {
            (Some(min), Some(n)) if n >= min => Status::Pass,
            _ => Status::Fail,
        };
    }
    if let Some(rest) = expected
        .strip_prefix("<=")
        .or_else(|| expected.strip_prefix('≤'))
    {
        return match (first_number(rest), exact_number(&actual)) {
            (Some(max), Some(n)) if n <= max => Status::Pass,
            _ => Status::Fail,
        };
    }
    if expected.contains('-') && !expected.starts_with('-') {
        return compare_range(&expected, &actual);
    }
    if expected == actual {
        Status::Pass
    } else {
        Status::Fail
    }
}

fn compare_range(expected: &str, actual: &str) -> Status {
    let bounds: Vec<_> = expected.split('-').map(exact_number).collect();
    let (Some(min), Some(max)) = (bounds.first().copied().flatten(), bounds.get(1).copied().flatten())
    else {
        return Status::Fail;
    };
    if bounds.len() != 2 {
        return Status::Fail;
    }
    match exact_number(actual) {
        Some(n) if (min..=max).contains(&n) => Status::Pass,
        Some(n) if n == min - 1 || n == max + 1 => Status::Warn,
        _ => Status::Fail,
    }
}

fn compare_percentage(expected: &str, actual: &str) -> Status {
    let (Some(target), Some(got)) = (first_number(expected), first_number(actual)) else {
        return Status::Fail;
    };
    if expected.contains(">=") || expected.contains('≥') {
        if got >= target {
            return Status::Pass;
        }
        if got >= target - WARN_THRESHOLD_PCT {
            return Status::Warn;
        }
        return Status::Fail;
    }
    if got == target {
        Status::Pass
    } else {
        Status::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_status_line_wins() {
        let j = judge(
            "Looking at the story...\nstatus: warn\nanswer: \"2 roles\"\nrationale: admin missing\n",
            "yes",
            3,
        )
        .unwrap();
        assert_eq!(j.status, Status::Warn);
        assert_eq!(j.actual, "2 roles");
        assert_eq!(j.rationale.as_deref(), Some("admin missing"));
    }

    #[test]
    fn first_line_compared_case_insensitively() {
        let j = judge("\n  Yes\nbecause reasons", "yes", 0).unwrap();
        assert_eq!(j.status, Status::Pass);
        assert_eq!(j.actual, "Yes");
        assert_eq!(judge("No", "yes", 0).unwrap().status, Status::Fail);
    }

    #[test]
    fn answer_line_is_compared_without_status() {
        let j = judge("answer: yes\nrationale: story has ACs\n", "yes", 0).unwrap();
        assert_eq!(j.status, Status::Pass);
        assert_eq!(j.actual, "yes");
        assert_eq!(j.rationale.as_deref(), Some("story has ACs"));

        let j = judge("Counting the criteria.\nactual: \"4\"\n", "= total AC count", 4).unwrap();
        assert_eq!(j.status, Status::Pass);
        assert_eq!(j.actual, "4");
    }

    #[test]
    fn empty_response_is_parse_error() {
        assert!(judge("  \n\n", "yes", 0).is_err());
    }

    #[test]
    fn total_ac_count() {
        assert_eq!(compare("= total AC count", "4", 4), Status::Pass);
        assert_eq!(compare("= total AC count", "3", 4), Status::Fail);
    }

    #[test]
    fn bounds() {
        assert_eq!(compare(">=2", "3", 0), Status::Pass);
        assert_eq!(compare("≥ 2", "1", 0), Status::Fail);
        assert_eq!(compare("<=10", "10", 0), Status::Pass);
        assert_eq!(compare("≤3", "many", 0), Status::Fail);
    }

    #[test]
    fn ranges_warn_one_outside() {
        assert_eq!(compare("3-7", "5", 0), Status::Pass);
        assert_eq!(compare("3-7", "2", 0), Status::Warn);
        assert_eq!(compare("3-7", "8", 0), Status::Warn);
        assert_eq!(compare("3-7", "9", 0), Status::Fail);
        assert_eq!(compare("3-x", "3", 0), Status::Fail);
    }

    #[test]
    fn percentages_warn_within_ten_points() {
        assert_eq!(compare(">=80%", "85%", 0), Status::Pass);
        assert_eq!(compare(">=80%", "72%", 0), Status::Warn);
        assert_eq!(compare(">=80%", "60", 0), Status::Fail);
    }
}
