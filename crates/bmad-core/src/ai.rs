use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use claude_agent::{ExecuteRequest, ExecutionMode};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Executes one prompt against the AI backend and returns the concatenated
/// text of the response.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn execute(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
        mode: &ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// [`AiClient`] backed by the `claude` CLI.
#[derive(Debug, Clone, Default)]
pub struct ClaudeClient {
    executable: Option<String>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ClaudeClient {
    pub fn new(engine: &EngineConfig) -> Self {
        Self {
            executable: engine.executable.clone(),
            cwd: None,
            timeout: engine.timeout_minutes.map(|m| Duration::from_secs(m * 60)),
        }
    }

    /// Working directory of the spawned CLI (the project root).
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

#[async_trait]
impl AiClient for ClaudeClient {
    async fn execute(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
        mode: &ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut request = ExecuteRequest::new(system_prompt, user_prompt, mode.clone());
        request.model = Some(model.to_string()).filter(|m| !m.is_empty());
        request.cwd = self.cwd.clone();
        request.executable = self.executable.clone();
        request.timeout = self.timeout;
        let text = claude_agent::execute(request, cancel).await?;
        if text.trim().is_empty() {
            return Err(Error::ai("empty output"));
        }
        Ok(text)
    }
}
