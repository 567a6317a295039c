//! Pull-request review triage.
//!
//! Per unresolved review thread:
//!
//! ```text
//! NEW → ANALYZED → (AWAIT_APPROVAL) → IMPLEMENTED → RESOLVED
//! NEW → ANALYZED → AWAIT_APPROVAL → SKIPPED     (approval declined)
//! any → FAILED                                   (AI / parse / platform error)
//! ```

pub mod generators;
pub mod github;
pub mod orchestrator;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::parser::HeuristicResult;

pub use github::GhCli;
pub use orchestrator::{ThreadOutcome, TriageOrchestrator, TriageSummary};

/// Reply posted to threads closed because their code moved on.
pub const OUTDATED_REPLY: &str = "This thread resolved as outdated.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub file: String,
    pub line: u32,
    pub body: String,
    pub url: String,
    pub outdated: bool,
}

/// An unresolved review thread as returned by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Thread {
    pub id: String,
    pub comments: Vec<Comment>,
}

/// One thread bound to its pull request. Never mutated after fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreadContext {
    pub pr_number: u64,
    pub thread_id: String,
    pub comments: Vec<Comment>,
}

impl ThreadContext {
    pub fn new(pr_number: u64, thread: Thread) -> Self {
        Self {
            pr_number,
            thread_id: thread.id,
            comments: thread.comments,
        }
    }

    pub fn first_comment(&self) -> Option<&Comment> {
        self.comments.first()
    }

    /// `file:line` of the first comment.
    pub fn location(&self) -> String {
        self.first_comment()
            .map(|c| format!("{}:{}", c.file, c.line))
            .unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.first_comment().map_or("", |c| c.url.as_str())
    }

    /// Comment bodies in server order, separated by `---` lines.
    pub fn conversation(&self) -> String {
        self.comments
            .iter()
            .map(|c| c.body.trim())
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    pub fn is_outdated(&self) -> bool {
        self.first_comment().is_some_and(|c| c.outdated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadState {
    New,
    Analyzed,
    AwaitApproval,
    Implemented,
    Resolved,
    Skipped,
    Failed,
}

impl ThreadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadState::New => "NEW",
            ThreadState::Analyzed => "ANALYZED",
            ThreadState::AwaitApproval => "AWAIT_APPROVAL",
            ThreadState::Implemented => "IMPLEMENTED",
            ThreadState::Resolved => "RESOLVED",
            ThreadState::Skipped => "SKIPPED",
            ThreadState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hosted review platform.
#[async_trait]
pub trait ReviewPlatform: Send + Sync {
    /// Pull request of the current branch.
    async fn pr_number(&self, cancel: &CancellationToken) -> Result<u64>;

    /// Unresolved threads with at least one comment, in server order.
    async fn threads(&self, pr_number: u64, cancel: &CancellationToken) -> Result<Vec<Thread>>;

    async fn reply(&self, thread_id: &str, body: &str, cancel: &CancellationToken) -> Result<()>;

    async fn resolve(&self, thread_id: &str, cancel: &CancellationToken) -> Result<()>;
}

/// Asks a human before a high-risk change is implemented.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(
        &self,
        thread: &ThreadContext,
        result: &HeuristicResult,
        cancel: &CancellationToken,
    ) -> Result<bool>;
}
