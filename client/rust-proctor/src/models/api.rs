use serde::{Deserialize, Serialize};

use crate::models::violation::{ViolationEvent, ViolationKind};
use crate::models::{OptionLetter, Question};

#[derive(Debug, Clone, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt_id: String,
    pub questions: Vec<Question>,
    pub remaining_seconds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestStatusResponse {
    pub is_live: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerWriteRequest {
    pub attempt_id: String,
    pub question_id: String,
    pub selected_option: OptionLetter,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogViolationRequest {
    pub attempt_id: String,
    pub violation_type: ViolationKind,
    pub violation_source: String,
    pub extra_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitAttemptRequest {
    pub attempt_id: String,
    pub forced_submission: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAttemptResponse {
    pub percentage: f64,
    pub pass_status: bool,
}

impl LogViolationRequest {
    pub fn from_event(attempt_id: &str, event: &ViolationEvent) -> Self {
        Self {
            attempt_id: attempt_id.to_string(),
            violation_type: event.kind,
            violation_source: event.source.clone(),
            extra_payload: event.extra_payload.clone(),
        }
    }
}
