#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use urdu_gpt_lib::commands::{Cue, Feedback};
use urdu_gpt_lib::llm::{GenerationClient, GenerationRequest, LlmError};

/// Replies with queued results in order and records every request.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(text: &str) -> Self {
        let client = Self::new();
        client.push_ok(text);
        client
    }

    pub fn failing(err: LlmError) -> Self {
        let client = Self::new();
        client.push_err(err);
        client
    }

    pub fn push_ok(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_err(&self, err: LlmError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::NoCandidates))
    }
}

/// Collects cues for assertions.
#[derive(Clone, Default)]
pub struct RecordingFeedback {
    pub cues: Arc<Mutex<Vec<Cue>>>,
}

impl RecordingFeedback {
    pub fn cues(&self) -> Vec<Cue> {
        self.cues.lock().unwrap().clone()
    }
}

impl Feedback for RecordingFeedback {
    fn play(&self, cue: Cue) {
        self.cues.lock().unwrap().push(cue);
    }
}
