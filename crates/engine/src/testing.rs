//! Scripted LLM client for engine tests.

use futures::stream;
use std::collections::VecDeque;
use std::sync::Mutex;
use tome_core::{AppError, AppResult};
use tome_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};

/// An `LlmClient` that replays scripted responses in order.
///
/// `complete` and `stream` both consume the next response; `stream` yields
/// it word by word. Once the script is exhausted, calls fail, which makes
/// unexpected LLM calls visible in tests.
pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
}

impl MockLlm {
    pub fn scripted(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| r.to_string()).collect()),
        }
    }

    fn next_response(&self) -> AppResult<String> {
        self.responses
            .lock()
            .map_err(|_| AppError::Llm("mock poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| AppError::Llm("mock script exhausted".to_string()))
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlm {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = self.next_response()?;
        Ok(LlmResponse {
            content,
            model: "mock".to_string(),
            usage: LlmUsage::default(),
            done: true,
        })
    }

    async fn stream(&self, _request: &LlmRequest) -> AppResult<LlmStream> {
        let content = self.next_response()?;
        let words: Vec<String> = content
            .split_inclusive(' ')
            .map(|w| w.to_string())
            .collect();
        let total = words.len();

        let chunks = words.into_iter().enumerate().map(move |(i, word)| {
            Ok(LlmStreamChunk {
                content: word,
                model: "mock".to_string(),
                done: i + 1 == total,
                usage: None,
            })
        });
        Ok(Box::pin(stream::iter(chunks)))
    }
}
