pub mod pr;
pub mod us;

use anyhow::{Context, Result};
use bmad_core::ai::ClaudeClient;
use bmad_core::config::Config;
use bmad_core::pipeline::GeneratorContext;
use bmad_core::run_dir::RunDirectory;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Everything one invocation shares: configuration, the run directory, the
/// AI backend and the cancellation token.
pub struct Session {
    pub root: PathBuf,
    pub config: Config,
    pub run_dir: RunDirectory,
    pub ai: ClaudeClient,
    pub cancel: CancellationToken,
}

impl Session {
    pub fn open(root: &Path, config: Config, cancel: CancellationToken) -> Result<Self> {
        let run_dir = RunDirectory::create(&root.join(&config.paths.tmp_dir), chrono::Local::now())
            .context("create run directory")?;
        let ai = ClaudeClient::new(&config.engine).with_cwd(root);
        Ok(Self {
            root: root.to_path_buf(),
            config,
            run_dir,
            ai,
            cancel,
        })
    }

    pub fn ctx(&self) -> GeneratorContext<'_> {
        GeneratorContext::new(&self.ai, &self.run_dir, &self.config.engine.model, &self.cancel)
    }

    /// A configured path resolved against the project root.
    pub fn path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    pub fn today(&self) -> String {
        chrono::Local::now().format("%Y-%m-%d").to_string()
    }
}
