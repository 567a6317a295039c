//! Interactive fix loop for failed checklist results.
//!
//! ```text
//!  failed report
//!       │
//!       ▼
//!  fix-prompt generator ──questions──► ask human ──answers──┐
//!       │ fix prompt                                        │
//!       ▼                                                   │
//!  apply / refine / exit ──refine (feedback)────────────────┤
//!       │ apply                                             │
//!       ▼                                                   │
//!  applier → save_next → re-evaluate ──still failing────────┘
//!       │ all pass
//!       ▼
//!    Passed
//! ```
//!
//! There is no iteration cap; the human ends the loop.

pub mod applier;
pub mod generator;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::checklist::{Checklist, ChecklistEvaluator, Extraction, Report, ValidationResult};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::GeneratorContext;
use crate::story::model::StoryDocument;
use crate::version_store::VersionStore;

pub use applier::FixApplier;
pub use generator::{FixPromptGenerator, FixProposal};

/// A question the model needs answered before it can write a fix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyQuestion {
    pub id: String,
    #[serde(alias = "question")]
    pub text: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Apply,
    Refine,
    Exit,
}

/// Everything the loop asks of the human.
#[async_trait]
pub trait Interaction: Send + Sync {
    /// Answers keyed by question id.
    async fn ask_questions(
        &self,
        questions: &[ClarifyQuestion],
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, String>>;

    async fn show_report(&self, report: &Report) -> Result<()>;

    async fn show_fix_prompt(&self, fix_prompt: &str) -> Result<()>;

    async fn choose_action(&self, cancel: &CancellationToken) -> Result<Action>;

    async fn refinement_feedback(&self, cancel: &CancellationToken) -> Result<String>;

    async fn confirm_copy(&self, cancel: &CancellationToken) -> Result<bool>;
}

/// How the loop ended. Both carry the path of the latest story version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    Passed { latest: PathBuf },
    Exited { latest: PathBuf },
}

impl LoopOutcome {
    pub fn latest(&self) -> &PathBuf {
        match self {
            LoopOutcome::Passed { latest } | LoopOutcome::Exited { latest } => latest,
        }
    }
}

pub struct FixLoop<'a> {
    config: &'a Config,
    ctx: GeneratorContext<'a>,
    evaluator: &'a ChecklistEvaluator<'a>,
    extraction: &'a Extraction,
    interaction: &'a dyn Interaction,
}

impl<'a> FixLoop<'a> {
    pub fn new(
        config: &'a Config,
        ctx: GeneratorContext<'a>,
        evaluator: &'a ChecklistEvaluator<'a>,
        extraction: &'a Extraction,
        interaction: &'a dyn Interaction,
    ) -> Self {
        Self {
            config,
            ctx,
            evaluator,
            extraction,
            interaction,
        }
    }

    /// Drive the loop from `report`, the evaluation of the latest version
    /// in `store`.
    pub async fn run(&self, store: &mut VersionStore, mut report: Report) -> Result<LoopOutcome> {
        let mut iteration = 0u32;
        loop {
            if report.all_passed() {
                return Ok(LoopOutcome::Passed {
                    latest: store.latest_path()?,
                });
            }
            iteration += 1;
            let failed: Vec<ValidationResult> = report.failed().cloned().collect();
            tracing::info!(iteration, failed = failed.len(), "starting fix iteration");

            let Some(fix_prompt) = self.agree_on_fix(store, &failed, iteration).await? else {
                tracing::info!(iteration, "fix loop exited by user");
                return Ok(LoopOutcome::Exited {
                    latest: store.latest_path()?,
                });
            };

            let latest_path = store.latest_path()?;
            let document: StoryDocument = store.load_latest()?;
            let applier = FixApplier {
                config: self.config,
                document: &document,
                story_path: latest_path,
                fix_prompt: &fix_prompt,
                iteration,
                artifact: self
                    .ctx
                    .artifact_path(document.id(), &FixApplier::prefix_for(iteration)),
            };
            let updated = self.ctx.run(document.id(), &applier).await?;
            let saved = store.save_next(&updated)?;
            tracing::info!(iteration, file = %saved.display(), "fix applied");

            report = self
                .evaluator
                .evaluate(&self.ctx, &updated, self.extraction, iteration + 1)
                .await?;
            self.interaction.show_report(&report).await?;
        }
    }

    /// Generate fix prompts until the human applies one (`Some`) or exits
    /// (`None`).
    async fn agree_on_fix(
        &self,
        store: &VersionStore,
        failed: &[ValidationResult],
        iteration: u32,
    ) -> Result<Option<String>> {
        let cancel = self.ctx.cancel;
        let story_path = store.latest_path()?;
        let document: StoryDocument = store.load_latest()?;
        let mut answers = BTreeMap::new();
        let mut feedback: Vec<String> = Vec::new();
        let mut rounds = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let prefix = FixPromptGenerator::prefix_for(iteration, attempt);
            let generator = FixPromptGenerator {
                config: self.config,
                document: &document,
                story_path: story_path.clone(),
                failed,
                answers: &answers,
                feedback: &feedback,
                iteration,
                attempt,
                artifact: self.ctx.artifact_path(document.id(), &prefix),
            };
            let fix_prompt = match self.ctx.run(document.id(), &generator).await? {
                FixProposal::Questions(questions) => {
                    rounds += 1;
                    if let Some(max) = self.config.fix_loop.max_clarification_rounds {
                        if rounds > max {
                            return Err(Error::ai(format!(
                                "no fix prompt after {max} clarification round(s)"
                            )));
                        }
                    }
                    tracing::info!(count = questions.len(), round = rounds, "clarification needed");
                    let given = self.interaction.ask_questions(&questions, cancel).await?;
                    answers.extend(given);
                    continue;
                }
                FixProposal::FixPrompt(p) => p,
            };

            self.interaction.show_fix_prompt(&fix_prompt).await?;
            match self.interaction.choose_action(cancel).await? {
                Action::Apply => return Ok(Some(fix_prompt)),
                Action::Exit => return Ok(None),
                Action::Refine => {
                    let text = self.interaction.refinement_feedback(cancel).await?;
                    if !text.trim().is_empty() {
                        feedback.push(text);
                    }
                }
            }
        }
    }
}

/// Evaluate the latest version in `store` against the configured
/// checklist, show the report, and run the fix loop on failures.
pub async fn review(
    config: &Config,
    ctx: GeneratorContext<'_>,
    store: &mut VersionStore,
    interaction: &dyn Interaction,
) -> Result<LoopOutcome> {
    let checklist = Checklist::load(config.checklist_path()?)?;
    let extraction = checklist.extract();
    tracing::info!(
        prompts = extraction.prompts.len(),
        skipped = extraction.skipped,
        "checklist extracted"
    );
    let evaluator = ChecklistEvaluator::new(config)?;
    let document: StoryDocument = store.load_latest()?;
    let report = evaluator.evaluate(&ctx, &document, &extraction, 1).await?;
    interaction.show_report(&report).await?;
    FixLoop::new(config, ctx, &evaluator, &extraction, interaction)
        .run(store, report)
        .await
}
