use std::fmt;

use claude_agent::ClaudeAgentError;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure category. Stage wrapping keeps the kind of the innermost error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Template,
    Ai,
    Parse,
    Validation,
    Store,
    Platform,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Template => "template",
            ErrorKind::Ai => "ai",
            ErrorKind::Parse => "parse",
            ErrorKind::Validation => "validation",
            ErrorKind::Store => "store",
            ErrorKind::Platform => "platform",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one error type of the core: a kind, a short context line, and the
/// wrapped cause. `Display` never includes the cause; walk `source()` (or
/// use [`report`]) to see the chain.
#[derive(Debug, Error)]
#[error("{context}")]
pub struct Error {
    kind: ErrorKind,
    context: String,
    #[source]
    source: Option<BoxError>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            source: None,
        }
    }

    pub fn wrap(
        kind: ErrorKind,
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            kind,
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub fn config(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, context)
    }

    pub fn template(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Template, context)
    }

    pub fn ai(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ai, context)
    }

    pub fn parse(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, context)
    }

    pub fn platform(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Platform, context)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled")
    }

    /// A semantic-validator failure naming the predicate and the offending path.
    pub fn validation(predicate: &str, path: &str, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::Validation,
            format!("{predicate} failed at {path}: {detail}"),
        )
    }

    /// Wrap with the name of the stage the error surfaced in.
    pub fn stage(self, name: &str) -> Self {
        let kind = self.kind;
        Self::wrap(kind, format!("stage {name}"), self)
    }

    /// Wrap with free-form context, keeping the kind.
    pub fn context(self, context: impl Into<String>) -> Self {
        let kind = self.kind;
        Self::wrap(kind, context, self)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Attach a kind and context to any foreign error.
pub trait ResultExt<T> {
    fn or_kind(self, kind: ErrorKind, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BoxError>,
{
    fn or_kind(self, kind: ErrorKind, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| Error::wrap(kind, context(), e))
    }
}

impl From<ClaudeAgentError> for Error {
    fn from(e: ClaudeAgentError) -> Self {
        match e {
            ClaudeAgentError::Cancelled => Error::cancelled(),
            ClaudeAgentError::EmptyOutput => Error::wrap(ErrorKind::Ai, "empty output", e),
            other => Error::wrap(ErrorKind::Ai, "ai backend call failed", other),
        }
    }
}

/// The innermost core error kind anywhere in a chain.
pub fn kind_of(err: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    let mut found = None;
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cur {
        if let Some(core) = e.downcast_ref::<Error>() {
            found = Some(core.kind());
        }
        cur = e.source();
    }
    found
}

/// Render an error chain on one line: `[kind] outer: inner: root`.
pub fn report(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut cur = err.source();
    while let Some(e) = cur {
        let msg = e.to_string();
        if parts.last() != Some(&msg) {
            parts.push(msg);
        }
        cur = e.source();
    }
    match kind_of(err) {
        Some(kind) => format!("[{kind}] {}", parts.join(": ")),
        None => parts.join(": "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wrapping_keeps_kind_and_cause() {
        let root = Error::parse("risk_score anchor not found");
        let err = root.stage("parse-response").context("heuristic for thread T1");
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.to_string(), "heuristic for thread T1");
        assert_eq!(
            report(&err),
            "[parse] heuristic for thread T1: stage parse-response: risk_score anchor not found"
        );
    }

    #[test]
    fn cause_is_not_inlined_into_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::wrap(ErrorKind::Store, "read story-4.1-v01.yaml", io);
        assert_eq!(err.to_string(), "read story-4.1-v01.yaml");
        assert!(std::error::Error::source(&err).is_some());
        assert!(report(&err).ends_with("no such file"));
    }

    #[test]
    fn agent_cancellation_maps_to_cancelled_kind() {
        let err: Error = ClaudeAgentError::Cancelled.into();
        assert!(err.is_cancelled());
        let err: Error = ClaudeAgentError::EmptyOutput.into();
        assert_eq!(err.kind(), ErrorKind::Ai);
    }

    #[test]
    fn kind_of_finds_innermost() {
        let inner = Error::cancelled();
        let outer = Error::wrap(ErrorKind::Ai, "call", inner);
        assert_eq!(kind_of(&outer), Some(ErrorKind::Cancelled));
    }
}
