use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaudeAgentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse stream-json line: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("process error: {0}")]
    Process(String),

    /// The backend finished with an error result.
    #[error("backend reported an error: {0}")]
    Backend(String),

    /// The stream produced no text at all.
    #[error("backend returned an empty response")]
    EmptyOutput,

    #[error("cancelled")]
    Cancelled,
}
