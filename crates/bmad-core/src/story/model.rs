use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

/// Accept `1`, `"1"` or `"AC-1"` for identifier fields.
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        S(String),
        I(i64),
        F(f64),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::S(s) => s,
        Raw::I(i) => i.to_string(),
        Raw::F(f) => f.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Story {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(rename = "as_a", default)]
    pub persona: String,
    #[serde(rename = "i_want", default)]
    pub want: String,
    #[serde(default)]
    pub so_that: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    /// Numbers of the acceptance criteria this task covers.
    #[serde(rename = "ac_refs", alias = "acceptance_criteria", default)]
    pub ac_refs: Vec<u32>,
    #[serde(default)]
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub status: String,
}

// ---------------------------------------------------------------------------
// Dev notes
// ---------------------------------------------------------------------------

/// Sub-documents every story must carry in `dev_notes`.
pub const MANDATORY_DEV_NOTES: [&str; 3] = ["technology_stack", "architecture", "file_structure"];

/// One named dev-notes sub-document. `source` and `description` are
/// checked by the semantic validator rather than at parse time so the
/// error can name the offending entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// `technology_stack`, `architecture`, `file_structure`,
/// `configuration`, `performance_requirements`, and any further entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevNotes(pub BTreeMap<String, DevNote>);

impl DevNotes {
    pub fn get(&self, name: &str) -> Option<&DevNote> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Testing / scenarios
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Testing {
    #[serde(default)]
    pub test_location: String,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub coverage: BTreeMap<String, String>,
}

/// One Gherkin step; exactly one keyword is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub but: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestScenario {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub scenario_outline: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mitigates_risks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenarios {
    #[serde(default)]
    pub test_scenarios: Vec<TestScenario>,
}

// ---------------------------------------------------------------------------
// Change log, QA, agent record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub date: String,
    pub version: String,
    pub description: String,
    pub author: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub risk_reason: String,
    #[serde(default)]
    pub testability_score: u32,
    #[serde(default)]
    pub testability_max: u32,
    #[serde(default)]
    pub testability_notes: String,
    #[serde(default)]
    pub implementation_readiness: u32,
    #[serde(default)]
    pub implementation_readiness_max: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaResults {
    #[serde(default)]
    pub review_date: String,
    #[serde(default)]
    pub reviewed_by: String,
    #[serde(default)]
    pub assessment: Assessment,
    #[serde(default)]
    pub gate_status: String,
    #[serde(default)]
    pub gate_reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevAgentRecord {
    #[serde(default)]
    pub agent_model_used: Option<String>,
    #[serde(default)]
    pub debug_log_references: Vec<String>,
    #[serde(default)]
    pub completion_notes: Vec<String>,
    #[serde(default)]
    pub file_list: Vec<String>,
}

// ---------------------------------------------------------------------------
// StoryDocument
// ---------------------------------------------------------------------------

/// The aggregate persisted as `story-<id>-vNN.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryDocument {
    pub story: Story,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub dev_notes: DevNotes,
    #[serde(default)]
    pub testing: Testing,
    #[serde(default)]
    pub scenarios: Scenarios,
    #[serde(default)]
    pub change_log: Vec<ChangeLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_results: Option<QaResults>,
    #[serde(default)]
    pub dev_agent_record: DevAgentRecord,
}

impl StoryDocument {
    /// A bare document around an epic story, stamped with the initial
    /// change-log entry.
    pub fn initial(story: Story, date: &str) -> Self {
        Self {
            story,
            change_log: vec![ChangeLogEntry {
                date: date.to_string(),
                version: "1.0.0".to_string(),
                description: "Initial story creation".to_string(),
                author: "bmad-cli".to_string(),
            }],
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.story.id
    }
}
