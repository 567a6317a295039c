//! Fix-prompt generation: turns the failed checklist results into either a
//! ready-to-apply fix prompt or a list of clarifying questions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ClarifyQuestion;
use crate::checklist::ValidationResult;
use crate::config::Config;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::parser::{markers, side_channel};
use crate::pipeline::{Generator, Prompts};
use crate::story::model::{Story, StoryDocument};
use crate::template::{build_optional, PromptBuilder};

/// What the generator produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixProposal {
    FixPrompt(String),
    Questions(Vec<ClarifyQuestion>),
}

#[derive(Debug, Default, Deserialize)]
struct QuestionList {
    #[serde(default)]
    questions: Vec<ClarifyQuestion>,
}

#[derive(Debug, Serialize)]
pub struct FixPromptData<'a> {
    pub story: &'a Story,
    pub document: &'a StoryDocument,
    pub story_path: String,
    pub failed_checks: &'a [ValidationResult],
    pub result_path: String,
    pub answers: &'a BTreeMap<String, String>,
    pub feedback: &'a [String],
    pub iteration: u32,
    pub doc_paths: BTreeMap<String, String>,
}

/// One fix-prompt attempt of iteration `iteration`.
pub struct FixPromptGenerator<'a> {
    pub config: &'a Config,
    pub document: &'a StoryDocument,
    pub story_path: PathBuf,
    pub failed: &'a [ValidationResult],
    pub answers: &'a BTreeMap<String, String>,
    pub feedback: &'a [String],
    pub iteration: u32,
    /// 1 for the first attempt of an iteration; clarifications and
    /// refinements bump it.
    pub attempt: u32,
    /// Side-channel file the model is asked to write.
    pub artifact: PathBuf,
}

impl FixPromptGenerator<'_> {
    pub fn prefix_for(iteration: u32, attempt: u32) -> String {
        match attempt {
            0 | 1 => format!("fix-iter{iteration}"),
            n => format!("fix-iter{iteration}-{n}"),
        }
    }
}

impl<'a> Generator for FixPromptGenerator<'a> {
    type Input = FixPromptData<'a>;
    type Output = FixProposal;

    fn prefix(&self) -> String {
        Self::prefix_for(self.iteration, self.attempt)
    }

    fn load_data(&self) -> Result<FixPromptData<'a>> {
        let mut keys: Vec<String> = self.failed.iter().flat_map(|r| r.docs.clone()).collect();
        keys.sort();
        keys.dedup();
        Ok(FixPromptData {
            story: &self.document.story,
            document: self.document,
            story_path: self.story_path.display().to_string(),
            failed_checks: self.failed,
            result_path: self.artifact.display().to_string(),
            answers: self.answers,
            feedback: self.feedback,
            iteration: self.iteration,
            doc_paths: self.config.document_paths(&keys),
        })
    }

    fn build_prompts(&self, data: &FixPromptData<'a>) -> Result<Prompts> {
        Ok(Prompts {
            system: build_optional(self.config.optional_template("fix_generator_system"), data)?,
            user: PromptBuilder::new(self.config.template("fix_generator")?).build(data)?,
        })
    }

    fn parse_response(&self, response: &str) -> Result<FixProposal> {
        if self.artifact.is_file() {
            let doc = side_channel::load(&self.artifact)?;
            let fix_prompt: Option<String> = side_channel::has_key(&doc, "fix_prompt")
                .then(|| side_channel::extract(&doc, "fix_prompt"))
                .transpose()?;
            let questions: Vec<ClarifyQuestion> = if side_channel::has_key(&doc, "questions") {
                side_channel::extract(&doc, "questions")?
            } else {
                Vec::new()
            };
            let fix_prompt = fix_prompt
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty());
            return proposal(fix_prompt, questions);
        }

        tracing::debug!(file = %self.artifact.display(), "no side-channel file, scanning response markers");
        if let Some(block) = markers::questions_block(response) {
            let list: QuestionList = serde_yaml::from_str(block)
                .or_kind(ErrorKind::Parse, || "parse questions block".into())?;
            if !list.questions.is_empty() {
                return Ok(FixProposal::Questions(list.questions));
            }
        }
        match markers::any_file_block(response) {
            Some((_, content)) if !content.is_empty() => Ok(FixProposal::FixPrompt(content.to_string())),
            _ => Err(Error::parse("response carries neither a fix prompt nor questions")),
        }
    }
}

fn proposal(fix_prompt: Option<String>, questions: Vec<ClarifyQuestion>) -> Result<FixProposal> {
    match (fix_prompt, questions.is_empty()) {
        (Some(_), false) => Err(Error::parse(
            "fix prompt and questions are mutually exclusive",
        )),
        (Some(p), true) => Ok(FixProposal::FixPrompt(p)),
        (None, false) => Ok(FixProposal::Questions(questions)),
        (None, true) => Err(Error::parse(
            "side-channel file has neither fix_prompt nor questions",
        )),
    }
}
