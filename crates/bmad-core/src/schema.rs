//! Structural (external `yamale`) and semantic story validation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::shell::Shell;
use crate::story::model::{
    AcceptanceCriterion, DevNotes, QaResults, ScenarioStep, Scenarios, StoryDocument, Task, Testing,
    MANDATORY_DEV_NOTES,
};

const DEFAULT_TOOL: &str = "yamale";

/// Runs `yamale -s <schema> <file>` when the tool is installed.
#[derive(Debug, Clone)]
pub struct StructuralValidator {
    schema: Option<PathBuf>,
    tool: String,
    shell: Shell,
}

impl StructuralValidator {
    pub fn new(schema: Option<PathBuf>) -> Self {
        Self {
            schema,
            tool: DEFAULT_TOOL.to_string(),
            shell: Shell::new(),
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Violations reported for `file`; empty means valid. A missing tool or
    /// an unconfigured schema yields no violations.
    pub async fn check_file(&self, file: &Path, cancel: &CancellationToken) -> Result<Vec<String>> {
        let Some(schema) = &self.schema else {
            tracing::debug!("no story schema configured, skipping structural validation");
            return Ok(Vec::new());
        };
        if which::which(&self.tool).is_err() {
            tracing::warn!(tool = %self.tool, "schema tool not found, skipping structural validation");
            return Ok(Vec::new());
        }
        if !schema.is_file() {
            return Err(Error::config(format!(
                "story schema not found: {}",
                schema.display()
            )));
        }

        let schema_arg = schema.to_string_lossy();
        let file_arg = file.to_string_lossy();
        let out = self
            .shell
            .capture(&self.tool, &["-s", &schema_arg, &file_arg], cancel)
            .await?;
        if out.success {
            tracing::info!(file = %file.display(), "schema validation passed");
            return Ok(Vec::new());
        }
        let mut violations: Vec<String> = out
            .combined()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        if violations.is_empty() {
            violations.push(format!("{} exited with code {:?}", self.tool, out.code));
        }
        Ok(violations)
    }

    pub async fn validate_file(&self, file: &Path, cancel: &CancellationToken) -> Result<()> {
        let violations = self.check_file(file, cancel).await?;
        if violations.is_empty() {
            return Ok(());
        }
        Err(Error::validation(
            "schema",
            &file.display().to_string(),
            violations.join("; "),
        ))
    }

    /// Serialize `value` to a temp file and validate that.
    pub async fn validate<T: Serialize>(&self, value: &T, cancel: &CancellationToken) -> Result<()> {
        if self.schema.is_none() {
            return Ok(());
        }
        let yaml = serde_yaml::to_string(value)
            .or_kind(ErrorKind::Validation, || "serialize for schema check".to_string())?;
        let tmp = tempfile::Builder::new()
            .prefix("story-")
            .suffix(".yaml")
            .tempfile()
            .or_kind(ErrorKind::Store, || "create temp file".to_string())?;
        std::fs::write(tmp.path(), yaml)
            .or_kind(ErrorKind::Store, || format!("write {}", tmp.path().display()))?;
        self.validate_file(tmp.path(), cancel).await
    }
}

// ---------------------------------------------------------------------------
// Semantic validators
// ---------------------------------------------------------------------------

/// Every mandatory dev-notes entry exists, and every entry carries a
/// non-empty `source` and `description`.
pub fn validate_dev_notes(notes: &DevNotes) -> Result<()> {
    for name in MANDATORY_DEV_NOTES {
        if notes.get(name).is_none() {
            return Err(Error::validation(
                "dev_notes mandatory entries",
                &format!("dev_notes.{name}"),
                "entry missing",
            ));
        }
    }
    for (name, note) in &notes.0 {
        for (field, value) in [("source", &note.source), ("description", &note.description)] {
            if value.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(Error::validation(
                    "dev_notes source and description",
                    &format!("dev_notes.{name}.{field}"),
                    format!("{name} is missing required field {field}"),
                ));
            }
        }
    }
    Ok(())
}

/// At least one task, each with a name.
pub fn validate_tasks(tasks: &[Task]) -> Result<()> {
    if tasks.is_empty() {
        return Err(Error::validation("tasks non-empty", "tasks", "no tasks generated"));
    }
    for (i, task) in tasks.iter().enumerate() {
        if task.name.trim().is_empty() {
            return Err(Error::validation(
                "task name present",
                &format!("tasks[{i}].name"),
                "empty name",
            ));
        }
    }
    Ok(())
}

pub fn validate_testing(testing: &Testing) -> Result<()> {
    if testing.test_location.trim().is_empty() {
        return Err(Error::validation("test location present", "testing.test_location", "empty"));
    }
    if testing.frameworks.is_empty() {
        return Err(Error::validation("frameworks non-empty", "testing.frameworks", "no framework named"));
    }
    if testing.requirements.is_empty() {
        return Err(Error::validation(
            "requirements non-empty",
            "testing.requirements",
            "no testing requirement",
        ));
    }
    if testing.coverage.is_empty() {
        return Err(Error::validation("coverage targets present", "testing.coverage", "no targets"));
    }
    for (key, value) in &testing.coverage {
        if !value.contains('%') {
            return Err(Error::validation(
                "coverage is a percentage",
                &format!("testing.coverage.{key}"),
                format!("'{value}' has no %"),
            ));
        }
    }
    Ok(())
}

fn ac_key(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    lower
        .strip_prefix("ac-")
        .or_else(|| lower.strip_prefix("ac"))
        .unwrap_or(&lower)
        .trim()
        .to_string()
}

/// At least one scenario; each has an id, criteria, and given/when/then
/// steps; together they cover every acceptance criterion.
pub fn validate_scenarios(scenarios: &Scenarios, criteria: &[AcceptanceCriterion]) -> Result<()> {
    if scenarios.test_scenarios.is_empty() {
        return Err(Error::validation(
            "scenarios non-empty",
            "scenarios.test_scenarios",
            "no scenario generated",
        ));
    }
    let mut covered = BTreeSet::new();
    for (i, scenario) in scenarios.test_scenarios.iter().enumerate() {
        let path = format!("scenarios.test_scenarios[{i}]");
        if scenario.id.trim().is_empty() {
            return Err(Error::validation("scenario id present", &format!("{path}.id"), "empty"));
        }
        if scenario.acceptance_criteria.is_empty() {
            return Err(Error::validation(
                "scenario references criteria",
                &format!("{path}.acceptance_criteria"),
                format!("scenario {} covers no criterion", scenario.id),
            ));
        }
        let has = |f: fn(&ScenarioStep) -> bool| scenario.steps.iter().any(f);
        if !(has(|s| s.given.is_some()) && has(|s| s.when.is_some()) && has(|s| s.then.is_some())) {
            return Err(Error::validation(
                "scenario has given/when/then",
                &format!("{path}.steps"),
                format!("scenario {} lacks a given, when or then step", scenario.id),
            ));
        }
        covered.extend(scenario.acceptance_criteria.iter().map(|ac| ac_key(ac)));
    }
    for ac in criteria {
        if !covered.contains(&ac_key(&ac.id)) {
            return Err(Error::validation(
                "every criterion covered",
                "scenarios.test_scenarios",
                format!("acceptance criterion {} has no scenario", ac.id),
            ));
        }
    }
    Ok(())
}

const RISK_LEVELS: [&str; 3] = ["Low", "Medium", "High"];
const GATE_STATUSES: [&str; 4] = ["PASS", "CONCERNS", "FAIL", "WAIVED"];

pub fn validate_qa_results(qa: &QaResults) -> Result<()> {
    let a = &qa.assessment;
    if a.summary.trim().is_empty() {
        return Err(Error::validation("summary present", "qa_results.assessment.summary", "empty"));
    }
    if a.strengths.is_empty() {
        return Err(Error::validation(
            "strengths non-empty",
            "qa_results.assessment.strengths",
            "no strength identified",
        ));
    }
    if !RISK_LEVELS.contains(&a.risk_level.as_str()) {
        return Err(Error::validation(
            "risk level Low|Medium|High",
            "qa_results.assessment.risk_level",
            format!("got '{}'", a.risk_level),
        ));
    }
    for (field, score) in [
        ("testability_score", a.testability_score),
        ("implementation_readiness", a.implementation_readiness),
    ] {
        if !(1..=10).contains(&score) {
            return Err(Error::validation(
                "score within 1..=10",
                &format!("qa_results.assessment.{field}"),
                score,
            ));
        }
    }
    if !GATE_STATUSES.contains(&qa.gate_status.as_str()) {
        return Err(Error::validation(
            "known gate status",
            "qa_results.gate_status",
            format!("got '{}'", qa.gate_status),
        ));
    }
    Ok(())
}

pub fn validate_story_document(doc: &StoryDocument) -> Result<()> {
    validate_tasks(&doc.tasks)?;
    validate_dev_notes(&doc.dev_notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::model::DevNote;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn note(source: Option<&str>, description: Option<&str>) -> DevNote {
        DevNote {
            source: source.map(String::from),
            description: description.map(String::from),
            extra: BTreeMap::new(),
        }
    }

    fn complete_notes() -> DevNotes {
        let mut map = BTreeMap::new();
        for name in MANDATORY_DEV_NOTES {
            map.insert(name.to_string(), note(Some("architecture.md"), Some("desc")));
        }
        DevNotes(map)
    }

    #[test]
    fn complete_dev_notes_pass() {
        validate_dev_notes(&complete_notes()).unwrap();
    }

    #[test]
    fn missing_file_structure_source_names_entry_and_field() {
        let mut notes = complete_notes();
        notes.0.insert("file_structure".into(), note(None, Some("layout")));
        let err = validate_dev_notes(&notes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let msg = err.to_string();
        assert!(msg.contains("file_structure"), "{msg}");
        assert!(msg.contains("source"), "{msg}");
    }

    #[test]
    fn missing_mandatory_entry_fails() {
        let mut notes = complete_notes();
        notes.0.remove("architecture");
        let err = validate_dev_notes(&notes).unwrap_err();
        assert!(err.to_string().contains("dev_notes.architecture"));
    }

    #[test]
    fn optional_entries_also_need_description() {
        let mut notes = complete_notes();
        notes
            .0
            .insert("configuration".into(), note(Some("config.md"), Some("  ")));
        let err = validate_dev_notes(&notes).unwrap_err();
        assert!(err.to_string().contains("configuration.description"));
    }

    #[test]
    fn tasks_must_be_named() {
        assert!(validate_tasks(&[]).is_err());
        let tasks = vec![Task {
            name: " ".into(),
            ..Default::default()
        }];
        assert!(validate_tasks(&tasks)
            .unwrap_err()
            .to_string()
            .contains("tasks[0].name"));
    }

    #[tokio::test]
    async fn unconfigured_schema_or_missing_tool_is_ok() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("story.yaml");
        std::fs::write(&file, "story: {}\n").unwrap();
        let cancel = CancellationToken::new();

        let none = StructuralValidator::new(None);
        assert!(none.check_file(&file, &cancel).await.unwrap().is_empty());

        let schema = dir.path().join("schema.yaml");
        std::fs::write(&schema, "story: map()\n").unwrap();
        let missing = StructuralValidator::new(Some(schema)).with_tool("yamale-not-installed-xyz");
        assert!(missing.check_file(&file, &cancel).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_tool_reports_violation() {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join("schema.yaml");
        std::fs::write(&schema, "story: map()\n").unwrap();
        let cancel = CancellationToken::new();

        let passing = StructuralValidator::new(Some(schema.clone())).with_tool("true");
        passing.validate(&serde_json::json!({"story": {}}), &cancel).await.unwrap();

        let failing = StructuralValidator::new(Some(schema)).with_tool("false");
        let err = failing
            .validate(&serde_json::json!({"story": {}}), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    fn scenario(id: &str, acs: &[&str]) -> crate::story::model::TestScenario {
        let step = |given: Option<&str>, when: Option<&str>, then: Option<&str>| ScenarioStep {
            given: given.map(String::from),
            when: when.map(String::from),
            then: then.map(String::from),
            ..Default::default()
        };
        crate::story::model::TestScenario {
            id: id.into(),
            acceptance_criteria: acs.iter().map(|s| s.to_string()).collect(),
            steps: vec![
                step(Some("a writer"), None, None),
                step(None, Some("they type"), None),
                step(None, None, Some("others see it")),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn scenarios_must_cover_every_criterion() {
        let criteria = vec![
            AcceptanceCriterion {
                id: "1".into(),
                description: "a".into(),
            },
            AcceptanceCriterion {
                id: "2".into(),
                description: "b".into(),
            },
        ];
        let mut scenarios = Scenarios {
            test_scenarios: vec![scenario("S1", &["AC-1"])],
        };
        let err = validate_scenarios(&scenarios, &criteria).unwrap_err();
        assert!(err.to_string().contains("acceptance criterion 2"), "{err}");

        scenarios.test_scenarios.push(scenario("S2", &["2"]));
        validate_scenarios(&scenarios, &criteria).unwrap();

        scenarios.test_scenarios[1].steps.pop();
        let err = validate_scenarios(&scenarios, &criteria).unwrap_err();
        assert!(err.to_string().contains("test_scenarios[1].steps"), "{err}");
    }

    #[test]
    fn testing_coverage_is_a_percentage() {
        let mut testing = Testing {
            test_location: "tests/".into(),
            frameworks: vec!["cargo test".into()],
            requirements: vec!["unit tests".into()],
            coverage: BTreeMap::from([("unit".to_string(), "80%".to_string())]),
        };
        validate_testing(&testing).unwrap();
        testing.coverage.insert("e2e".into(), "most".into());
        assert!(validate_testing(&testing)
            .unwrap_err()
            .to_string()
            .contains("testing.coverage.e2e"));
    }

    #[test]
    fn qa_results_ranges() {
        let mut qa = QaResults {
            gate_status: "PASS".into(),
            ..Default::default()
        };
        qa.assessment.summary = "solid".into();
        qa.assessment.strengths = vec!["clear ACs".into()];
        qa.assessment.risk_level = "Low".into();
        qa.assessment.testability_score = 8;
        qa.assessment.implementation_readiness = 9;
        validate_qa_results(&qa).unwrap();

        qa.assessment.testability_score = 11;
        assert!(validate_qa_results(&qa).is_err());
        qa.assessment.testability_score = 8;
        qa.gate_status = "MAYBE".into();
        assert!(validate_qa_results(&qa)
            .unwrap_err()
            .to_string()
            .contains("gate_status"));
    }
}
