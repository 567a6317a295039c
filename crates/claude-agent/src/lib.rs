//! `claude-agent`: async driver for the `claude` CLI subprocess.
//!
//! Speaks the `--output-format stream-json` protocol and exposes a single
//! high-level operation, [`execute`], that runs one prompt under an
//! [`ExecutionMode`] and returns the concatenated assistant text.
//!
//! ```text
//! ExecuteRequest ──► QueryOptions (+ ExecutionMode tool profile)
//!                         │
//!                         ▼
//!                   ClaudeProcess   spawns `claude --output-format stream-json …`
//!                         │
//!                         ▼
//!                   QueryStream     futures::Stream<Item = Result<Message>>
//!                         │
//!                         ▼
//!                   collect_text    joins text blocks, checks the result
//! ```
//!
//! ```rust,ignore
//! use claude_agent::{execute, ExecuteRequest, ExecutionMode};
//! use tokio_util::sync::CancellationToken;
//!
//! let request = ExecuteRequest::new("", "Summarize README.md", ExecutionMode::restricted("./tmp"));
//! let text = execute(request, &CancellationToken::new()).await?;
//! ```

pub mod error;
pub mod mode;
pub mod runner;
pub mod types;

pub(crate) mod process;
pub mod stream;

#[cfg(test)]
mod tests;

pub use error::ClaudeAgentError;
pub use mode::ExecutionMode;
pub use runner::{execute, ExecuteRequest};
pub use stream::QueryStream;
pub use types::{
    AssistantContent, AssistantMessage, ContentBlock, Message, PermissionMode, QueryOptions,
    ResultError, ResultMessage, ResultSuccess, SystemMessage, SystemPayload, UserMessage,
};

pub type Result<T> = std::result::Result<T, ClaudeAgentError>;

/// Start one query; the returned stream ends after the `Result` message or
/// on process exit.
pub fn query(prompt: impl Into<String>, opts: QueryOptions) -> QueryStream {
    QueryStream::new(prompt.into(), opts)
}
