//! `us create`: an epic story grown into a full story document, one AI
//! generator per section.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::epic::{EpicLoader, StoryNumber};
use super::model::{Scenarios, Story, StoryDocument};
use crate::config::{Config, DOCUMENT_KEYS};
use crate::error::{Error, Result};
use crate::parser::{markers, side_channel};
use crate::pipeline::{Generator, GeneratorContext, Prompts};
use crate::schema;
use crate::template::{build_optional, PromptBuilder};

const QA_REVIEWER: &str = "Quinn (Test Architect)";

/// The generated sections, in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Tasks,
    DevNotes,
    Testing,
    Scenarios,
    QaResults,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Tasks,
        Section::DevNotes,
        Section::Testing,
        Section::Scenarios,
        Section::QaResults,
    ];

    /// Dump prefix and user-template key.
    pub fn prefix(self) -> &'static str {
        match self {
            Section::Tasks => "tasks",
            Section::DevNotes => "devnotes",
            Section::Testing => "testing",
            Section::Scenarios => "scenarios",
            Section::QaResults => "qa",
        }
    }

    /// Top-level key of the side-channel file.
    pub fn key(self) -> &'static str {
        match self {
            Section::Tasks => "tasks",
            Section::DevNotes => "dev_notes",
            Section::Testing => "testing",
            Section::Scenarios => "scenarios",
            Section::QaResults => "qa_results",
        }
    }
}

#[derive(Debug, Serialize)]
struct SectionData<'a> {
    story: &'a Story,
    document: &'a StoryDocument,
    docs: BTreeMap<String, String>,
    run_dir: String,
    result_path: String,
}

struct SectionGenerator<'a, T, F> {
    config: &'a Config,
    section: Section,
    document: &'a StoryDocument,
    run_dir: String,
    artifact: PathBuf,
    check: F,
    _output: PhantomData<fn() -> T>,
}

impl<'a, T, F> Generator for SectionGenerator<'a, T, F>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Result<()>,
{
    type Input = SectionData<'a>;
    type Output = T;

    fn prefix(&self) -> String {
        self.section.prefix().to_string()
    }

    fn load_data(&self) -> Result<SectionData<'a>> {
        let keys: Vec<String> = DOCUMENT_KEYS
            .iter()
            .filter(|k| self.config.documents.contains_key(**k))
            .map(|k| k.to_string())
            .collect();
        Ok(SectionData {
            story: &self.document.story,
            document: self.document,
            docs: self.config.document_paths(&keys),
            run_dir: self.run_dir.clone(),
            result_path: self.artifact.display().to_string(),
        })
    }

    fn build_prompts(&self, data: &SectionData<'a>) -> Result<Prompts> {
        let name = self.section.prefix();
        Ok(Prompts {
            system: build_optional(self.config.optional_template(&format!("{name}_system")), data)?,
            user: PromptBuilder::new(self.config.template(name)?).build(data)?,
        })
    }

    fn parse_response(&self, response: &str) -> Result<T> {
        let key = self.section.key();
        if self.artifact.is_file() {
            return side_channel::read_key(&self.artifact, key);
        }
        tracing::debug!(file = %self.artifact.display(), "no side-channel file, scanning response markers");
        let Some((_, content)) = markers::any_file_block(response) else {
            return Err(Error::parse(format!(
                "model wrote no {} and returned no file block",
                self.artifact.display()
            )));
        };
        side_channel::extract(&side_channel::parse_document(content)?, key)
    }

    fn validate(&self, output: &T) -> Result<()> {
        (self.check)(output)
    }
}

/// Builds story documents from epic stories.
pub struct StoryFactory<'a> {
    config: &'a Config,
    ctx: GeneratorContext<'a>,
    today: String,
}

impl<'a> StoryFactory<'a> {
    /// `today` (`YYYY-MM-DD`) stamps the change log and the QA review.
    pub fn new(config: &'a Config, ctx: GeneratorContext<'a>, today: impl Into<String>) -> Self {
        Self {
            config,
            ctx,
            today: today.into(),
        }
    }

    /// The epic story wrapped in a document with its initial change-log entry.
    pub fn initial_document(&self, number: StoryNumber) -> Result<StoryDocument> {
        let story = EpicLoader::new(&self.config.epics.path).load_story(number)?;
        Ok(StoryDocument::initial(story, &self.today))
    }

    /// Run every section generator in order. The first failure aborts.
    pub async fn generate(&self, number: StoryNumber) -> Result<StoryDocument> {
        let mut doc = self.initial_document(number)?;
        tracing::info!(story = %number, title = %doc.story.title, "generating story");

        doc.tasks = self
            .section(Section::Tasks, &doc, |t: &Vec<_>| schema::validate_tasks(t))
            .await?;
        doc.dev_notes = self
            .section(Section::DevNotes, &doc, schema::validate_dev_notes)
            .await?;
        doc.testing = self
            .section(Section::Testing, &doc, schema::validate_testing)
            .await?;
        let criteria = doc.story.acceptance_criteria.clone();
        doc.scenarios = self
            .section(Section::Scenarios, &doc, |s: &Scenarios| {
                schema::validate_scenarios(s, &criteria)
            })
            .await?;
        let mut qa = self
            .section(Section::QaResults, &doc, schema::validate_qa_results)
            .await?;
        qa.review_date = self.today.clone();
        if qa.reviewed_by.is_empty() {
            qa.reviewed_by = QA_REVIEWER.to_string();
        }
        doc.qa_results = Some(qa);

        tracing::info!(story = %number, tasks = doc.tasks.len(), "story generated");
        Ok(doc)
    }

    async fn section<T, F>(&self, section: Section, doc: &StoryDocument, check: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> Result<()>,
    {
        let generator = SectionGenerator {
            config: self.config,
            section,
            document: doc,
            run_dir: self.ctx.run_dir.path().display().to_string(),
            artifact: self.ctx.artifact_path(doc.id(), section.prefix()),
            check,
            _output: PhantomData,
        };
        self.ctx.run(doc.id(), &generator).await
    }
}
