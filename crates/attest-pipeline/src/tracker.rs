//! Observable submission progress

use crate::state::SubmissionState;
use attest_core::TokenId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Latest state and transition history per token id; clones share state
///
/// A new run for a token id starts a fresh history.
#[derive(Debug, Clone, Default)]
pub struct SubmissionTracker {
    runs: Arc<Mutex<HashMap<TokenId, Vec<SubmissionState>>>>,
}

impl SubmissionTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn transition(&self, token_id: &TokenId, state: SubmissionState) {
        let mut runs = self.runs.lock();
        let history = runs.entry(token_id.clone()).or_default();
        if state == SubmissionState::Received {
            history.clear();
        } else if let Some(previous) = history.last() {
            debug_assert!(
                previous.can_transition_to(state),
                "illegal transition {previous} -> {state}"
            );
        }
        history.push(state);
        tracing::debug!(token_id = %token_id, %state, "submission state");
    }

    /// Latest state of the most recent run for `token_id`
    pub fn status(&self, token_id: &TokenId) -> Option<SubmissionState> {
        self.runs.lock().get(token_id).and_then(|h| h.last().copied())
    }

    /// States visited by the most recent run for `token_id`
    pub fn history(&self, token_id: &TokenId) -> Vec<SubmissionState> {
        self.runs.lock().get(token_id).cloned().unwrap_or_default()
    }
}
