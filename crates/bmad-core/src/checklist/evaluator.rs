use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use super::{Extraction, PromptWithContext, Report, Status, ValidationResult};
use crate::config::Config;
use crate::error::{report, Result};
use crate::parser::answer::{judge, Judgement};
use crate::pipeline::{Generator, GeneratorContext, Prompts};
use crate::story::model::{Story, StoryDocument};
use crate::template::{build_optional, PromptBuilder};

/// Asks the AI every extracted checklist prompt about one story.
#[derive(Debug, Clone)]
pub struct ChecklistEvaluator<'a> {
    config: &'a Config,
    user_template: PathBuf,
    system_template: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ChecklistPromptData<'a> {
    story: &'a Story,
    document: &'a StoryDocument,
    question: &'a str,
    section: String,
    rationale: &'a str,
    /// Requested reference documents, key → path.
    docs: BTreeMap<String, String>,
}

struct PromptGenerator<'a> {
    evaluator: &'a ChecklistEvaluator<'a>,
    document: &'a StoryDocument,
    prompt: &'a PromptWithContext,
    round: u32,
}

impl Generator for PromptGenerator<'_> {
    type Input = BTreeMap<String, String>;
    type Output = Judgement;

    fn prefix(&self) -> String {
        self.prompt.dump_prefix(self.round)
    }

    fn load_data(&self) -> Result<Self::Input> {
        Ok(self.evaluator.config.document_paths(self.prompt.effective_docs()))
    }

    fn build_prompts(&self, docs: &Self::Input) -> Result<Prompts> {
        let data = ChecklistPromptData {
            story: &self.document.story,
            document: self.document,
            question: &self.prompt.prompt.question,
            section: self.prompt.section_path(),
            rationale: &self.prompt.prompt.rationale,
            docs: docs.clone(),
        };
        Ok(Prompts {
            system: build_optional(self.evaluator.system_template.as_deref(), &data)?,
            user: PromptBuilder::new(&self.evaluator.user_template).build(&data)?,
        })
    }

    fn parse_response(&self, response: &str) -> Result<Judgement> {
        judge(
            response,
            &self.prompt.prompt.answer,
            self.document.story.acceptance_criteria.len(),
        )
    }
}

impl<'a> ChecklistEvaluator<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Self {
            config,
            user_template: config.template("checklist")?.to_path_buf(),
            system_template: config.optional_template("checklist_system").map(PathBuf::from),
        })
    }

    /// Evaluate every prompt in order. A prompt whose AI call or parse fails
    /// becomes a FAIL with `ERROR: …` as its answer; cancellation aborts.
    ///
    /// `round` numbers the evaluation (1 for the first) so that dumps of
    /// later rounds sit beside earlier ones.
    pub async fn evaluate(
        &self,
        ctx: &GeneratorContext<'_>,
        document: &StoryDocument,
        extraction: &Extraction,
        round: u32,
    ) -> Result<Report> {
        let total = extraction.prompts.len();
        let mut results = Vec::with_capacity(total);
        for prompt in &extraction.prompts {
            tracing::info!(
                round,
                index = prompt.index,
                total,
                section = %prompt.section_path(),
                "evaluating prompt"
            );
            let generator = PromptGenerator {
                evaluator: self,
                document,
                prompt,
                round,
            };
            let judgement = match ctx.run(document.id(), &generator).await {
                Ok(j) => j,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::error!(section = %prompt.section_path(), error = %report(&e), "prompt evaluation failed");
                    Judgement {
                        status: Status::Fail,
                        actual: format!("ERROR: {}", report(&e)),
                        rationale: None,
                    }
                }
            };
            results.push(to_result(prompt, judgement));
        }

        let report = Report::new(
            document.id(),
            document.story.title.clone(),
            results,
            extraction.skipped,
        );
        tracing::info!(
            pass = report.summary.pass_count,
            warn = report.summary.warn_count,
            fail = report.summary.fail_count,
            overall = report.overall_status(),
            "checklist evaluated"
        );
        Ok(report)
    }
}

fn to_result(prompt: &PromptWithContext, judgement: Judgement) -> ValidationResult {
    ValidationResult {
        section_path: prompt.section_path(),
        question: prompt.prompt.question.clone(),
        expected: prompt.prompt.answer.clone(),
        actual: judgement.actual,
        status: judgement.status,
        rationale: judgement
            .rationale
            .unwrap_or_else(|| prompt.prompt.rationale.clone()),
        fix_prompt: None,
        prompt_index: prompt.index,
        docs: prompt.effective_docs().to_vec(),
    }
}
