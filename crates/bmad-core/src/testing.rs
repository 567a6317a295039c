//! Test doubles shared by the unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use claude_agent::ExecutionMode;
use tokio_util::sync::CancellationToken;

use crate::ai::AiClient;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct AiCall {
    pub system: String,
    pub user: String,
    pub model: String,
    pub mode: ExecutionMode,
}

type Responder = Box<dyn Fn(&AiCall) -> Result<String> + Send + Sync>;

/// Records every call and answers through a closure.
pub struct StubAi {
    responder: Responder,
    calls: Mutex<Vec<AiCall>>,
}

impl StubAi {
    pub fn new(responder: impl Fn(&AiCall) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Answers in order; fails once the script runs out.
    pub fn script(responses: Vec<&str>) -> Self {
        let queue: Mutex<Vec<String>> =
            Mutex::new(responses.into_iter().rev().map(String::from).collect());
        Self::new(move |_| {
            queue
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::ai("stub script exhausted"))
        })
    }

    pub fn calls(&self) -> Vec<AiCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiClient for StubAi {
    async fn execute(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
        mode: &ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        let call = AiCall {
            system: system_prompt.to_string(),
            user: user_prompt.to_string(),
            model: model.to_string(),
            mode: mode.clone(),
        };
        self.calls.lock().unwrap().push(call.clone());
        (self.responder)(&call)
    }
}
