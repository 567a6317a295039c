//! Applies an approved fix prompt to the latest story version.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::parser::{markers, side_channel};
use crate::pipeline::{Access, Generator, Prompts};
use crate::story::model::{AcceptanceCriterion, Story, StoryDocument};
use crate::template::{build_optional, PromptBuilder};

#[derive(Debug, Serialize)]
pub struct FixApplierData<'a> {
    pub story: &'a Story,
    pub document: &'a StoryDocument,
    pub story_path: String,
    pub fix_prompt: &'a str,
    pub result_path: String,
}

/// Full-access generator producing the next story version.
pub struct FixApplier<'a> {
    pub config: &'a Config,
    pub document: &'a StoryDocument,
    pub story_path: PathBuf,
    pub fix_prompt: &'a str,
    pub iteration: u32,
    pub artifact: PathBuf,
}

impl FixApplier<'_> {
    pub fn prefix_for(iteration: u32) -> String {
        format!("apply-iter{iteration}")
    }

    /// Merge a side-channel document holding either a full
    /// `story_document` or a replacement `acceptance_criteria` list.
    fn merge(&self, doc: &serde_yaml::Value) -> Result<StoryDocument> {
        if side_channel::has_key(doc, "story_document") {
            return side_channel::extract(doc, "story_document");
        }
        if side_channel::has_key(doc, "acceptance_criteria") {
            let criteria: Vec<AcceptanceCriterion> = side_channel::extract(doc, "acceptance_criteria")?;
            return Ok(self.with_criteria(criteria));
        }
        Err(Error::parse(
            "applier output has neither story_document nor acceptance_criteria",
        ))
    }

    fn with_criteria(&self, criteria: Vec<AcceptanceCriterion>) -> StoryDocument {
        let mut updated = self.document.clone();
        tracing::info!(
            before = updated.story.acceptance_criteria.len(),
            after = criteria.len(),
            "acceptance criteria replaced"
        );
        updated.story.acceptance_criteria = criteria;
        updated
    }
}

impl<'a> Generator for FixApplier<'a> {
    type Input = FixApplierData<'a>;
    type Output = StoryDocument;

    fn prefix(&self) -> String {
        Self::prefix_for(self.iteration)
    }

    fn access(&self) -> Access {
        Access::FullAccess
    }

    fn load_data(&self) -> Result<FixApplierData<'a>> {
        Ok(FixApplierData {
            story: &self.document.story,
            document: self.document,
            story_path: self.story_path.display().to_string(),
            fix_prompt: self.fix_prompt,
            result_path: self.artifact.display().to_string(),
        })
    }

    fn build_prompts(&self, data: &FixApplierData<'a>) -> Result<Prompts> {
        Ok(Prompts {
            system: build_optional(self.config.optional_template("fix_applier_system"), data)?,
            user: PromptBuilder::new(self.config.template("fix_applier")?).build(data)?,
        })
    }

    fn parse_response(&self, response: &str) -> Result<StoryDocument> {
        if self.artifact.is_file() {
            let doc = side_channel::load(&self.artifact)?;
            return self.merge(&doc);
        }
        let Some((_, content)) = markers::any_file_block(response) else {
            return Err(Error::parse(format!(
                "applier wrote no {} and returned no file block",
                self.artifact.display()
            )));
        };
        let doc = side_channel::parse_document(content)?;
        if doc.is_sequence() {
            let criteria = serde_yaml::from_value(doc)
                .or_kind(ErrorKind::Parse, || "decode acceptance criteria block".into())?;
            return Ok(self.with_criteria(criteria));
        }
        self.merge(&doc)
    }

    fn validate(&self, output: &StoryDocument) -> Result<()> {
        if output.id() != self.document.id() {
            return Err(Error::validation(
                "story id unchanged",
                "story.id",
                format!("expected {}, got {}", self.document.id(), output.id()),
            ));
        }
        if output.story.acceptance_criteria.is_empty() {
            return Err(Error::validation(
                "acceptance criteria non-empty",
                "story.acceptance_criteria",
                "no acceptance criteria left",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn document() -> StoryDocument {
        StoryDocument::initial(
            Story {
                id: "4.1".into(),
                title: "Editing".into(),
                acceptance_criteria: vec![AcceptanceCriterion {
                    id: "1".into(),
                    description: "old".into(),
                }],
                ..Default::default()
            },
            "2026-10-18",
        )
    }

    fn applier<'a>(config: &'a Config, doc: &'a StoryDocument, artifact: PathBuf) -> FixApplier<'a> {
        FixApplier {
            config,
            document: doc,
            story_path: PathBuf::from("story-4.1-v01.yaml"),
            fix_prompt: "add logout",
            iteration: 1,
            artifact,
        }
    }

    #[test]
    fn replaces_acceptance_criteria_from_side_channel() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("4.1-apply-iter1.yaml");
        std::fs::write(
            &artifact,
            "acceptance_criteria:\n  - id: 1\n    description: login\n  - id: 2\n    description: logout\n",
        )
        .unwrap();
        let (config, doc) = (Config::default(), document());
        let a = applier(&config, &doc, artifact);
        let updated = a.parse_response("").unwrap();
        a.validate(&updated).unwrap();
        assert_eq!(updated.story.acceptance_criteria.len(), 2);
        assert_eq!(updated.story.acceptance_criteria[1].description, "logout");
        assert_eq!(updated.change_log, doc.change_log);
    }

    #[test]
    fn accepts_full_document_and_rejects_id_change() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("4.1-apply-iter1.yaml");
        let mut replacement = document();
        replacement.story.id = "9.9".into();
        let yaml = serde_yaml::to_string(&serde_json::json!({ "story_document": replacement }))
            .unwrap();
        std::fs::write(&artifact, yaml).unwrap();
        let (config, doc) = (Config::default(), document());
        let a = applier(&config, &doc, artifact);
        let updated = a.parse_response("").unwrap();
        let err = a.validate(&updated).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn falls_back_to_file_block_list() {
        let dir = TempDir::new().unwrap();
        let (config, doc) = (Config::default(), document());
        let a = applier(&config, &doc, dir.path().join("missing.yaml"));
        let text = "=== FILE_START: r.yaml ===\n- id: 1\n  description: new\n=== FILE_END: r.yaml ===";
        let updated = a.parse_response(text).unwrap();
        assert_eq!(updated.story.acceptance_criteria[0].description, "new");
        assert!(a.parse_response("no block").is_err());
    }
}
