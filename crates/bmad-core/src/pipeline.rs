//! The generator pipeline: one AI-driven transformation step.
//!
//! ```text
//! S0 ensure run dir → S1 load data → S2 build prompts → S3 dump prompts
//!   → S4 call AI → S5 dump response → S6 parse → S7 validate → S8 return
//! ```
//!
//! Each step is described by a [`Generator`]; [`GeneratorContext::run`]
//! drives the stages in order. A failing stage aborts with an error naming
//! it. Dump failures (S3, S5) are only logged.

use std::path::PathBuf;

use claude_agent::ExecutionMode;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::ai::AiClient;
use crate::cancel;
use crate::error::{Error, Result};
use crate::io::write_diagnostic;
use crate::parser::side_channel;
use crate::run_dir::RunDirectory;

/// The rendered prompt pair of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompts {
    pub system: String,
    pub user: String,
}

/// Which tool profile a generator runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Writes only below the run directory.
    Restricted,
    FullAccess,
}

/// One AI-driven step, parameterized by its input and output types.
pub trait Generator {
    type Input;
    type Output;

    /// File prefix of the dumps, e.g. `tasks` or `fix-iter2`.
    fn prefix(&self) -> String;

    fn access(&self) -> Access {
        Access::Restricted
    }

    fn load_data(&self) -> Result<Self::Input>;

    fn build_prompts(&self, input: &Self::Input) -> Result<Prompts>;

    fn parse_response(&self, response: &str) -> Result<Self::Output>;

    fn validate(&self, _output: &Self::Output) -> Result<()> {
        Ok(())
    }
}

/// Collaborators shared by every generator of one invocation.
#[derive(Clone, Copy)]
pub struct GeneratorContext<'a> {
    pub ai: &'a dyn AiClient,
    pub run_dir: &'a RunDirectory,
    pub model: &'a str,
    pub cancel: &'a CancellationToken,
}

impl<'a> GeneratorContext<'a> {
    pub fn new(
        ai: &'a dyn AiClient,
        run_dir: &'a RunDirectory,
        model: &'a str,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            ai,
            run_dir,
            model,
            cancel,
        }
    }

    /// `<run_dir>/<id>-<prefix>.yaml`, where side-channel output lands.
    pub fn artifact_path(&self, id: &str, prefix: &str) -> PathBuf {
        side_channel::artifact_path(self.run_dir.path(), id, prefix)
    }

    pub fn dump_path(&self, id: &str, prefix: &str, kind: &str) -> PathBuf {
        self.run_dir.join(format!("{id}-{prefix}-{kind}.txt"))
    }

    fn mode(&self, access: Access) -> ExecutionMode {
        match access {
            Access::Restricted => ExecutionMode::restricted(self.run_dir.path()),
            Access::FullAccess => ExecutionMode::FullAccess,
        }
    }

    /// Run every stage of `generator` for entity `id`.
    pub async fn run<G: Generator>(&self, id: &str, generator: &G) -> Result<G::Output> {
        let prefix = generator.prefix();
        let span = tracing::info_span!("generator", id, prefix = %prefix);
        self.run_stages(id, &prefix, generator)
            .instrument(span)
            .await
            .map_err(|e| e.context(format!("generator {prefix} for {id}")))
    }

    async fn run_stages<G: Generator>(&self, id: &str, prefix: &str, generator: &G) -> Result<G::Output> {
        self.run_dir.ensure().map_err(|e| e.stage("ensure-run-dir"))?;

        cancel::check(self.cancel).map_err(|e| e.stage("load-data"))?;
        let input = generator.load_data().map_err(|e| e.stage("load-data"))?;

        let prompts = generator
            .build_prompts(&input)
            .map_err(|e| e.stage("build-prompts"))?;

        write_diagnostic(&self.dump_path(id, prefix, "system-prompt"), &prompts.system);
        write_diagnostic(&self.dump_path(id, prefix, "user-prompt"), &prompts.user);

        let mode = self.mode(generator.access());
        tracing::info!(mode = mode.name(), model = self.model, "calling AI");
        let response = self
            .ai
            .execute(&prompts.system, &prompts.user, self.model, &mode, self.cancel)
            .await
            .and_then(|text| {
                if text.trim().is_empty() {
                    Err(Error::ai("empty output"))
                } else {
                    Ok(text)
                }
            })
            .map_err(|e| e.stage("call-ai"))?;

        write_diagnostic(&self.dump_path(id, prefix, "full-response"), &response);

        cancel::check(self.cancel).map_err(|e| e.stage("parse-response"))?;
        let output = generator
            .parse_response(&response)
            .map_err(|e| e.stage("parse-response"))?;

        generator.validate(&output).map_err(|e| e.stage("validate"))?;
        tracing::debug!("generator finished");
        Ok(output)
    }
}
