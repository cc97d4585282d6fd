use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimerEvent {
    TimerTick(TimerTick),
    TimeExpired(TimeExpired),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimerTick {
    pub attempt_id: String,
    pub remaining_seconds: u32,
    pub elapsed_seconds: u32,
    pub total_seconds: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeExpired {
    pub attempt_id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl TimerEvent {
    pub fn tick(attempt_id: &str, remaining: u32, total: u32) -> Self {
        TimerEvent::TimerTick(TimerTick {
            attempt_id: attempt_id.to_string(),
            remaining_seconds: remaining,
            elapsed_seconds: total.saturating_sub(remaining),
            total_seconds: total,
            timestamp: Utc::now(),
        })
    }

    pub fn expired(attempt_id: &str) -> Self {
        TimerEvent::TimeExpired(TimeExpired {
            attempt_id: attempt_id.to_string(),
            timestamp: Utc::now(),
            message: "Time limit exceeded".to_string(),
        })
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            TimerEvent::TimerTick(_) => "timer-tick",
            TimerEvent::TimeExpired(_) => "time-expired",
        }
    }
}
