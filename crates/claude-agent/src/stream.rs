use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::process::ClaudeProcess;
use crate::types::{Message, QueryOptions};
use crate::Result;

// ─── QueryStream ──────────────────────────────────────────────────────────

/// Async stream of [`Message`]s from one `claude` subprocess.
///
/// A background task owns the [`ClaudeProcess`] and forwards messages over
/// an mpsc channel until the terminal `Result` message or process exit.
/// Dropping the stream closes the receiver; the task then stops and the
/// child is killed.
pub struct QueryStream {
    rx: mpsc::Receiver<Result<Message>>,
}

impl QueryStream {
    pub(crate) fn new(prompt: String, opts: QueryOptions) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            match ClaudeProcess::spawn(&prompt, &opts).await {
                Ok(process) => pump(process, tx).await,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        QueryStream { rx }
    }

    /// Wrap a raw receiver; tests inject pre-built message sequences.
    #[cfg(test)]
    pub(crate) fn from_channel(rx: mpsc::Receiver<Result<Message>>) -> Self {
        Self { rx }
    }
}

/// Forward messages from `process` into `tx` until a `Result` message, EOF,
/// an error, or a dropped receiver. A process that exits without a result
/// reports its exit status (and stderr) as the final item.
async fn pump(mut process: ClaudeProcess, tx: mpsc::Sender<Result<Message>>) {
    let mut got_result = false;
    loop {
        match process.next_message().await {
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
            Ok(None) => break,
            Ok(Some(msg)) => {
                let is_terminal = matches!(msg, Message::Result(_));
                got_result |= is_terminal;
                if tx.send(Ok(msg)).await.is_err() || is_terminal {
                    break;
                }
            }
        }
    }

    if !got_result {
        if let Some(exit_err) = process.wait_exit_error().await {
            let _ = tx.send(Err(exit_err)).await;
        }
    }

    process.kill().await;
}

impl Stream for QueryStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
