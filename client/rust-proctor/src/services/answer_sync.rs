use crate::metrics;
use crate::models::api::AnswerWriteRequest;
use crate::models::OptionLetter;
use crate::services::api_client::TestApi;

/// Single-slot write-behind buffer for answer selections. Re-selecting
/// before a flush overwrites the slot, so at most one write per flush
/// point reaches the backend.
#[derive(Debug, Default)]
pub struct AnswerBuffer {
    pending: Option<PendingAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
    pub question_id: String,
    pub selected_option: OptionLetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed,
    Failed,
    Empty,
}

impl AnswerBuffer {
    pub fn new() -> Self {
        Self { pending: None }
    }

    pub fn stage(&mut self, question_id: &str, selected_option: OptionLetter) {
        self.pending = Some(PendingAnswer {
            question_id: question_id.to_string(),
            selected_option,
        });
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingAnswer> {
        self.pending.as_ref()
    }

    /// Takes the slot and sends it. The slot is cleared before the send,
    /// so a failed write is dropped rather than replayed; the caller's
    /// flow is never blocked on the outcome.
    pub async fn flush(&mut self, api: &TestApi, test_id: &str, attempt_id: &str) -> FlushOutcome {
        let Some(pending) = self.pending.take() else {
            return FlushOutcome::Empty;
        };

        let request = AnswerWriteRequest {
            attempt_id: attempt_id.to_string(),
            question_id: pending.question_id.clone(),
            selected_option: pending.selected_option,
        };

        match api.write_answer(test_id, &request).await {
            Ok(()) => {
                metrics::ANSWER_FLUSHES_TOTAL
                    .with_label_values(&["flushed"])
                    .inc();
                tracing::debug!(
                    "Flushed answer: question={}, option={}",
                    pending.question_id,
                    pending.selected_option
                );
                FlushOutcome::Flushed
            }
            Err(e) => {
                metrics::ANSWER_FLUSHES_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                tracing::warn!(
                    "Failed to flush answer for question {}: {}",
                    pending.question_id,
                    e
                );
                FlushOutcome::Failed
            }
        }
    }
}
