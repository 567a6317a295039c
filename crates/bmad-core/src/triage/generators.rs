//! The two AI steps run per review thread.

use serde::Serialize;

use super::ThreadContext;
use crate::config::Config;
use crate::error::Result;
use crate::parser::HeuristicResult;
use crate::pipeline::{Access, Generator, Prompts};
use crate::template::{build_optional, PromptBuilder};

pub const DEFAULT_SUMMARY: &str = "Applied changes as requested";

#[derive(Debug, Serialize)]
pub struct ThreadPromptData<'a> {
    pub pr_number: u64,
    pub thread_id: &'a str,
    pub location: String,
    pub url: &'a str,
    pub conversation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heuristic: Option<&'a HeuristicResult>,
}

impl<'a> ThreadPromptData<'a> {
    fn new(thread: &'a ThreadContext, heuristic: Option<&'a HeuristicResult>) -> Self {
        Self {
            pr_number: thread.pr_number,
            thread_id: &thread.thread_id,
            location: thread.location(),
            url: thread.url(),
            conversation: thread.conversation(),
            heuristic,
        }
    }
}

/// Restricted-mode assessment of one thread.
pub struct HeuristicGenerator<'a> {
    pub config: &'a Config,
    pub thread: &'a ThreadContext,
}

impl<'a> Generator for HeuristicGenerator<'a> {
    type Input = ThreadPromptData<'a>;
    type Output = HeuristicResult;

    fn prefix(&self) -> String {
        "heuristic".to_string()
    }

    fn load_data(&self) -> Result<ThreadPromptData<'a>> {
        Ok(ThreadPromptData::new(self.thread, None))
    }

    fn build_prompts(&self, data: &ThreadPromptData<'a>) -> Result<Prompts> {
        let user = PromptBuilder::new(self.config.template("heuristic")?)
            .with_reference(self.config.templates.heuristic_checklist.clone())
            .build(data)?;
        Ok(Prompts {
            system: build_optional(self.config.optional_template("heuristic_system"), data)?,
            user,
        })
    }

    fn parse_response(&self, response: &str) -> Result<HeuristicResult> {
        HeuristicResult::parse(response)
    }

    fn validate(&self, output: &HeuristicResult) -> Result<()> {
        output.validate()
    }
}

/// Full-access step that edits the working tree; yields a one-line summary.
pub struct ImplementationGenerator<'a> {
    pub config: &'a Config,
    pub thread: &'a ThreadContext,
    pub heuristic: &'a HeuristicResult,
}

impl<'a> Generator for ImplementationGenerator<'a> {
    type Input = ThreadPromptData<'a>;
    type Output = String;

    fn prefix(&self) -> String {
        "implementation".to_string()
    }

    fn access(&self) -> Access {
        Access::FullAccess
    }

    fn load_data(&self) -> Result<ThreadPromptData<'a>> {
        Ok(ThreadPromptData::new(self.thread, Some(self.heuristic)))
    }

    fn build_prompts(&self, data: &ThreadPromptData<'a>) -> Result<Prompts> {
        Ok(Prompts {
            system: build_optional(self.config.optional_template("implementation_system"), data)?,
            user: PromptBuilder::new(self.config.template("implementation")?).build(data)?,
        })
    }

    fn parse_response(&self, response: &str) -> Result<String> {
        Ok(summary_line(response))
    }
}

/// First non-empty line of the reply.
pub fn summary_line(response: &str) -> String {
    response
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map_or_else(|| DEFAULT_SUMMARY.to_string(), String::from)
}
