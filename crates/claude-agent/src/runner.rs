use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::mode::ExecutionMode;
use crate::stream::QueryStream;
use crate::{query, ClaudeAgentError, Message, QueryOptions, Result};

// ─── ExecuteRequest ───────────────────────────────────────────────────────

/// One prompt to run to completion.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Replaces the CLI's default system prompt when non-empty.
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: Option<String>,
    pub mode: ExecutionMode,
    pub cwd: Option<PathBuf>,
    pub executable: Option<String>,
    /// Upper bound on the whole call; `None` leaves it to the CLI.
    pub timeout: Option<Duration>,
}

impl ExecuteRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: None,
            mode,
            cwd: None,
            executable: None,
            timeout: None,
        }
    }

    fn options(&self) -> QueryOptions {
        QueryOptions {
            model: self.model.clone(),
            system_prompt: Some(self.system_prompt.clone()).filter(|s| !s.trim().is_empty()),
            cwd: self.cwd.clone(),
            path_to_executable: self.executable.clone(),
            ..Default::default()
        }
        .with_mode(&self.mode)
    }
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Run one prompt and return the concatenated text of every assistant text
/// block.
///
/// Fails with [`ClaudeAgentError::Backend`] when the terminal result is an
/// error, [`ClaudeAgentError::EmptyOutput`] when no text came back, and
/// [`ClaudeAgentError::Cancelled`] as soon as `cancel` fires (the
/// subprocess is killed when its stream is dropped).
pub async fn execute(request: ExecuteRequest, cancel: &CancellationToken) -> Result<String> {
    tracing::debug!(
        mode = request.mode.name(),
        model = request.model.as_deref().unwrap_or("default"),
        prompt_len = request.user_prompt.len(),
        "executing prompt"
    );
    let stream = query(request.user_prompt.clone(), request.options());
    let collected = async {
        match request.timeout {
            Some(limit) => tokio::time::timeout(limit, collect_text(stream))
                .await
                .map_err(|_| ClaudeAgentError::Process(format!("timed out after {limit:?}")))?,
            None => collect_text(stream).await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClaudeAgentError::Cancelled),
        res = collected => res,
    }
}

// ─── Internal ─────────────────────────────────────────────────────────────

/// Drain `stream`, joining assistant text with newlines. When the assistant
/// turns carry no text, the result message's own text is used instead.
pub(crate) async fn collect_text(stream: QueryStream) -> Result<String> {
    let mut stream = stream;
    let mut parts: Vec<String> = Vec::new();
    let mut final_text: Option<String> = None;

    while let Some(msg) = stream.next().await {
        let msg = msg?;
        if let Some(text) = msg.assistant_text() {
            parts.push(text);
            continue;
        }
        if let Message::Result(r) = msg {
            if r.is_error() {
                return Err(ClaudeAgentError::Backend(r.error_summary()));
            }
            tracing::debug!(turns = r.num_turns(), cost_usd = r.total_cost_usd(), "prompt finished");
            final_text = Some(r.result_text().unwrap_or_default().to_string());
            break;
        }
    }

    let Some(result_text) = final_text else {
        return Err(ClaudeAgentError::Process(
            "stream ended without a result message".into(),
        ));
    };

    let joined = if parts.is_empty() {
        result_text
    } else {
        parts.join("\n")
    };
    if joined.trim().is_empty() {
        return Err(ClaudeAgentError::EmptyOutput);
    }
    Ok(joined)
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::stream::tests::{mock_stream, INIT_LINE, RESULT_LINE, TEXT_LINE};
    use crate::types::{
        AssistantContent, AssistantMessage, ContentBlock, ResultError, ResultMessage,
        ResultSuccess,
    };

    fn assistant(blocks: Vec<ContentBlock>) -> Message {
        Message::Assistant(AssistantMessage {
            message: AssistantContent {
                id: None,
                role: "assistant".into(),
                content: blocks,
                model: None,
                stop_reason: None,
            },
            parent_tool_use_id: None,
            error: None,
            session_id: "s1".into(),
        })
    }

    fn text(t: &str) -> ContentBlock {
        ContentBlock::Text { text: t.into() }
    }

    fn success(result: &str, is_error: bool) -> Message {
        Message::Result(ResultMessage::Success(ResultSuccess {
            session_id: "s1".into(),
            result: result.into(),
            is_error,
            num_turns: 2,
            total_cost_usd: 0.01,
        }))
    }

    fn channel_stream(messages: Vec<Result<Message>>) -> QueryStream {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for msg in messages {
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        });
        QueryStream::from_channel(rx)
    }

    #[tokio::test]
    async fn concatenates_text_blocks_across_messages() {
        let stream = channel_stream(vec![
            Ok(assistant(vec![
                text("first"),
                ContentBlock::Thinking {
                    thinking: "hidden".into(),
                },
                text("second"),
            ])),
            Ok(assistant(vec![ContentBlock::ToolUse {
                id: "t1".into(),
                name: "Read".into(),
                input: serde_json::json!({"file_path": "a"}),
            }])),
            Ok(assistant(vec![text("third")])),
            Ok(success("ignored", false)),
        ]);
        let out = collect_text(stream).await.unwrap();
        assert_eq!(out, "first\nsecond\nthird");
    }

    #[tokio::test]
    async fn falls_back_to_result_text() {
        let stream = channel_stream(vec![Ok(success("only the result", false))]);
        assert_eq!(collect_text(stream).await.unwrap(), "only the result");
    }

    #[tokio::test]
    async fn error_result_is_backend_error() {
        let stream = channel_stream(vec![Ok(Message::Result(ResultMessage::ErrorMaxTurns(
            ResultError {
                session_id: "s1".into(),
                num_turns: 10,
                total_cost_usd: 0.0,
                errors: vec!["turn limit".into()],
            },
        )))]);
        let err = collect_text(stream).await.unwrap_err();
        assert!(matches!(err, ClaudeAgentError::Backend(ref m) if m.contains("turn limit")));
    }

    #[tokio::test]
    async fn success_flagged_as_error_is_backend_error() {
        let stream = channel_stream(vec![Ok(success("API Error: overloaded", true))]);
        assert!(matches!(
            collect_text(stream).await,
            Err(ClaudeAgentError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn whitespace_only_output_is_empty_output() {
        let stream = channel_stream(vec![
            Ok(assistant(vec![text("  \n ")])),
            Ok(success("", false)),
        ]);
        assert!(matches!(
            collect_text(stream).await,
            Err(ClaudeAgentError::EmptyOutput)
        ));
    }

    #[tokio::test]
    async fn missing_result_is_process_error() {
        let (tx, rx) = mpsc::channel::<Result<Message>>(1);
        drop(tx);
        let err = collect_text(QueryStream::from_channel(rx)).await.unwrap_err();
        assert!(err.to_string().contains("result message"));
    }

    #[tokio::test]
    async fn collects_from_subprocess_output() {
        let stream = mock_stream(&[INIT_LINE, TEXT_LINE, RESULT_LINE]);
        assert_eq!(collect_text(stream).await.unwrap(), "risk_score: 4");
    }

    #[tokio::test]
    async fn cancelled_token_aborts_execute() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut request = ExecuteRequest::new("", "hello", ExecutionMode::FullAccess);
        request.executable = Some("sleep".into());
        let err = execute(request, &cancel).await.unwrap_err();
        assert!(matches!(err, ClaudeAgentError::Cancelled));
    }
}
