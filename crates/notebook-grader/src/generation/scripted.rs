use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use super::backend::{CompletionBackend, CompletionRequest};
use crate::errors::AttemptError;

/// Backend that replays canned replies in order. No network access.
///
/// Once the script is exhausted every call fails with a transport error.
/// Each call's request and (tokio) instant are recorded for assertions.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    failure: Option<String>,
    calls: Mutex<Vec<(Instant, CompletionRequest)>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Backend whose every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            failure: Some(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.lock_calls().iter().map(|(at, _)| *at).collect()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock_calls().iter().map(|(_, req)| req.clone()).collect()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<(Instant, CompletionRequest)>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AttemptError> {
        self.lock_calls().push((Instant::now(), request.clone()));

        if let Some(message) = &self.failure {
            return Err(AttemptError::Transport(message.clone()));
        }

        let next = self
            .replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        next.ok_or_else(|| AttemptError::Transport("scripted replies exhausted".into()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
