//! Scripted generative client for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, GenerativeClient, GenerativeError};

/// Client that replays a script of outcomes, then a default outcome.
///
/// Every call is counted and its prompt recorded, so tests can assert how
/// many attempts the pipeline made and what it asked for.
pub struct MockClient {
    script: Mutex<VecDeque<Result<String, GenerativeError>>>,
    default_outcome: Result<String, GenerativeError>,
    delay: Option<Duration>,
    call_count: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl MockClient {
    /// Creates a client that always answers `response`.
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_outcome: Ok(response.into()),
            delay: None,
            call_count: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Creates a client whose every call fails with `error`.
    pub fn failing(error: GenerativeError) -> Self {
        Self {
            default_outcome: Err(error),
            ..Self::default()
        }
    }

    /// Queues outcomes consumed before the default one.
    #[must_use]
    pub fn with_script(self, outcomes: impl IntoIterator<Item = Result<String, GenerativeError>>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(outcomes);
        self
    }

    /// Sleeps before answering each call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `complete` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new("Mock explanation")
    }
}

#[async_trait]
impl GenerativeClient for MockClient {
    fn id(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GenerativeError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.prompt_text);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted
            .unwrap_or_else(|| self.default_outcome.clone())
            .map(|text| CompletionResponse { text })
    }
}
