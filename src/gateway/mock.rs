//! Scripted LLM backend for tests and offline runs.

use super::{GenerationOptions, LlmBackend};
use crate::error::{GatewayError, ProviderErrorKind};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

type Handler = Box<dyn Fn(&str) -> Result<String, GatewayError> + Send + Sync>;

/// Replays queued replies in order, then falls back to an optional handler.
///
/// Every prompt and its options are recorded so tests can assert on what a
/// stage actually sent.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, GatewayError>>>,
    handler: Option<Handler>,
    prompts: Mutex<Vec<String>>,
    options: Mutex<Vec<GenerationOptions>>,
    delay: Duration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedBackend {
    /// Successful replies, in order.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|s| Ok(s.into())).collect())
    }

    /// Mixed successes and failures, in order.
    pub fn from_results(results: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            handler: None,
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Answer every prompt with `handler` once the queue is empty.
    pub fn with_handler(
        mut self,
        handler: impl Fn(&str) -> Result<String, GatewayError> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// A backend whose every call fails with `error`.
    pub fn failing(error: GatewayError) -> Self {
        Self::from_results(Vec::new()).with_handler(move |_| Err(error.clone()))
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn options(&self) -> Vec<GenerationOptions> {
        lock(&self.options).clone()
    }

    /// Queued replies not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GatewayError> {
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.options).push(*options);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = lock(&self.script).pop_front();
        match (next, &self.handler) {
            (Some(reply), _) => reply,
            (None, Some(handler)) => handler(prompt),
            (None, None) => Err(GatewayError::provider(
                "mock",
                ProviderErrorKind::Api,
                "script exhausted",
            )),
        }
    }
}
