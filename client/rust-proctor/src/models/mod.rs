use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::models::api::StartAttemptResponse;
use crate::models::violation::ViolationKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub attempt_id: String,
    pub test_id: String,
    pub questions: Vec<Question>,
    pub answers: HashMap<String, OptionLetter>,
    pub current_index: usize,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    Idle,
    Loading,
    Running,
    Submitting,
    Terminated,
}

pub mod api;
pub mod timer;
pub mod violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Forced(ForcedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedReason {
    TimeEnded,
    PublishWindowEnded,
    PageUnload,
    ViolationLimit(ViolationKind),
}

impl Attempt {
    pub fn from_start(test_id: &str, start: StartAttemptResponse) -> Self {
        Self {
            attempt_id: start.attempt_id,
            test_id: test_id.to_string(),
            questions: start.questions,
            answers: HashMap::new(),
            current_index: 0,
            remaining_seconds: start.remaining_seconds,
            total_seconds: start.remaining_seconds,
            started_at: Utc::now(),
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.total_seconds.saturating_sub(self.remaining_seconds)
    }
}

impl Question {
    pub fn option_text(&self, letter: OptionLetter) -> &str {
        match letter {
            OptionLetter::A => &self.option_a,
            OptionLetter::B => &self.option_b,
            OptionLetter::C => &self.option_c,
            OptionLetter::D => &self.option_d,
        }
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            OptionLetter::A => "A",
            OptionLetter::B => "B",
            OptionLetter::C => "C",
            OptionLetter::D => "D",
        };
        write!(f, "{}", letter)
    }
}

impl FromStr for OptionLetter {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "a" | "A" => Ok(OptionLetter::A),
            "b" | "B" => Ok(OptionLetter::B),
            "c" | "C" => Ok(OptionLetter::C),
            "d" | "D" => Ok(OptionLetter::D),
            _ => Err(()),
        }
    }
}

impl AttemptPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptPhase::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptPhase::Idle => "idle",
            AttemptPhase::Loading => "loading",
            AttemptPhase::Running => "running",
            AttemptPhase::Submitting => "submitting",
            AttemptPhase::Terminated => "terminated",
        }
    }
}

impl SubmitTrigger {
    pub fn is_forced(&self) -> bool {
        matches!(self, SubmitTrigger::Forced(_))
    }

    pub fn forced_flag(&self) -> u8 {
        if self.is_forced() {
            1
        } else {
            0
        }
    }

    pub fn reason_label(&self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "MANUAL",
            SubmitTrigger::Forced(reason) => reason.label(),
        }
    }
}

impl ForcedReason {
    pub fn label(&self) -> &'static str {
        match self {
            ForcedReason::TimeEnded => "TIME_ENDED",
            ForcedReason::PublishWindowEnded => "PUBLISH_WINDOW_ENDED",
            ForcedReason::PageUnload => "PAGE_UNLOAD",
            ForcedReason::ViolationLimit(kind) => kind.as_str(),
        }
    }
}
