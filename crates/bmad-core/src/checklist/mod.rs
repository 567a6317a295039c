//! The story checklist: declarative validation prompts grouped into stages
//! and sections, the evaluator that asks the AI each of them, and the
//! report it produces.

pub mod evaluator;
pub mod report;
pub mod table;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result, ResultExt};
use crate::story::model::string_or_number;

pub use evaluator::ChecklistEvaluator;
pub use report::{Report, Summary, ValidationResult};

/// Outcome of one validation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Warn,
    Fail,
    Skip,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
            Status::Skip => "SKIP",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question with its expected answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationPrompt {
    #[serde(rename = "Q", default, deserialize_with = "string_or_number")]
    pub question: String,
    #[serde(rename = "A", default, deserialize_with = "string_or_number")]
    pub answer: String,
    #[serde(default)]
    pub rationale: String,
    /// Non-empty means the prompt is excluded from evaluation.
    #[serde(default)]
    pub skip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action_if_yes: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action_if_fail: String,
    /// Reference document keys (`architecture`, `prd`, …).
    #[serde(default)]
    pub docs: Vec<String>,
}

impl ValidationPrompt {
    pub fn should_skip(&self) -> bool {
        !self.skip.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub validation_prompts: Vec<ValidationPrompt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Used only when the stage has no sections.
    #[serde(default)]
    pub validation_prompts: Vec<ValidationPrompt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    #[serde(default, deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub default_docs: Vec<String>,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

/// A prompt tagged with where it lives in the checklist.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptWithContext {
    pub stage_id: String,
    pub stage_name: String,
    pub section_id: Option<String>,
    pub section_name: Option<String>,
    pub default_docs: Vec<String>,
    /// 1-based position among the evaluated prompts.
    pub index: usize,
    pub prompt: ValidationPrompt,
}

impl PromptWithContext {
    /// `stage/section`, or just `stage` for section-less stages.
    pub fn section_path(&self) -> String {
        match &self.section_id {
            Some(section) => format!("{}/{section}", self.stage_id),
            None => self.stage_id.clone(),
        }
    }

    /// The prompt's own docs, else the checklist defaults.
    pub fn effective_docs(&self) -> &[String] {
        if self.prompt.docs.is_empty() {
            &self.default_docs
        } else {
            &self.prompt.docs
        }
    }

    /// Dump prefix for evaluation `round`, e.g. `checklist-r2-invest-valuable-03`.
    pub fn dump_prefix(&self, round: u32) -> String {
        format!(
            "checklist-r{round}-{}-{:02}",
            self.section_path().replace('/', "-"),
            self.index
        )
    }
}

/// Prompts selected for evaluation plus how many were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub prompts: Vec<PromptWithContext>,
    pub skipped: usize,
}

impl Checklist {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .or_kind(ErrorKind::Config, || format!("read checklist {}", path.display()))?;
        let checklist = Self::parse(&data)
            .map_err(|e| e.context(format!("checklist {}", path.display())))?;
        tracing::debug!(
            path = %path.display(),
            version = %checklist.version,
            stages = checklist.stages.len(),
            "checklist loaded"
        );
        Ok(checklist)
    }

    pub fn parse(data: &str) -> Result<Self> {
        serde_yaml::from_str(data).or_kind(ErrorKind::Config, || "parse checklist YAML".into())
    }

    /// Every non-skipped prompt in document order.
    pub fn extract(&self) -> Extraction {
        let mut out = Extraction::default();
        for stage in &self.stages {
            let groups: Vec<(Option<&Section>, &[ValidationPrompt])> = if stage.sections.is_empty() {
                vec![(None, stage.validation_prompts.as_slice())]
            } else {
                stage
                    .sections
                    .iter()
                    .map(|s| (Some(s), s.validation_prompts.as_slice()))
                    .collect()
            };
            for (section, prompts) in groups {
                for prompt in prompts {
                    if prompt.should_skip() {
                        tracing::debug!(question = %prompt.question, reason = %prompt.skip, "prompt skipped");
                        out.skipped += 1;
                        continue;
                    }
                    out.prompts.push(PromptWithContext {
                        stage_id: stage.id.clone(),
                        stage_name: stage.name.clone(),
                        section_id: section.map(|s| s.id.clone()),
                        section_name: section.map(|s| s.name.clone()),
                        default_docs: self.default_docs.clone(),
                        index: out.prompts.len() + 1,
                        prompt: prompt.clone(),
                    });
                }
            }
        }
        tracing::debug!(count = out.prompts.len(), skipped = out.skipped, "prompts extracted");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) const SAMPLE: &str = r#"
version: 2
last_updated: "2025-01-10"
default_docs: [prd]
stages:
  - id: template
    name: Template
    sections:
      - id: who
        name: Who
        validation_prompts:
          - Q: Is the persona a concrete user role?
            A: "yes"
            rationale: Vague personas hide requirements
          - Q: Does the persona match the PRD roles?
            A: "yes"
            skip: "N/A until roles are defined"
  - id: dependencies
    name: Dependencies
    validation_prompts:
      - Q: How many external dependencies?
        A: 0-2
        docs: [architecture, tech_stack]
"#;

    #[test]
    fn extract_excludes_skipped_and_tags_paths() {
        let checklist = Checklist::parse(SAMPLE).unwrap();
        assert_eq!(checklist.version, "2");
        let extraction = checklist.extract();
        assert_eq!(extraction.skipped, 1);
        let paths: Vec<_> = extraction.prompts.iter().map(|p| p.section_path()).collect();
        assert_eq!(paths, vec!["template/who", "dependencies"]);
        assert_eq!(extraction.prompts[1].dump_prefix(1), "checklist-r1-dependencies-02");
        assert_eq!(extraction.prompts[0].dump_prefix(3), "checklist-r3-template-who-01");
    }

    #[test]
    fn effective_docs_fall_back_to_defaults() {
        let extraction = Checklist::parse(SAMPLE).unwrap().extract();
        assert_eq!(extraction.prompts[0].effective_docs(), ["prd".to_string()]);
        assert_eq!(
            extraction.prompts[1].effective_docs(),
            ["architecture".to_string(), "tech_stack".to_string()]
        );
    }

    #[test]
    fn numeric_answers_are_read_as_text() {
        let checklist = Checklist::parse(
            "stages:\n  - id: size\n    validation_prompts:\n      - Q: How many ACs?\n        A: 5\n",
        )
        .unwrap();
        assert_eq!(checklist.stages[0].validation_prompts[0].answer, "5");
    }

    #[test]
    fn invalid_yaml_is_config_error() {
        let err = Checklist::parse("stages: [").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
