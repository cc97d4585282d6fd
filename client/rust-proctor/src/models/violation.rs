use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    WindowBlur,
    TabSwitch,
    ExitFullscreen,
}

/// Raw signal delivered by the hosting environment. Only some of these
/// map to countable violations; the rest are blocked or suppressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegritySignal {
    WindowBlur,
    DocumentHidden,
    FullscreenExit,
    KeyCombo(String),
    ContextMenu,
    PageUnload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationEvent {
    pub id: Uuid,
    pub kind: ViolationKind,
    pub source: String,
    pub extra_payload: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

/// Monotone per-attempt warning tally. There is no decrement and no
/// reset; a fresh attempt constructs a fresh counter.
#[derive(Debug)]
pub struct WarningCounter {
    count: u32,
    max: u32,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::WindowBlur => "WINDOW_BLUR",
            ViolationKind::TabSwitch => "TAB_SWITCH",
            ViolationKind::ExitFullscreen => "EXIT_FULLSCREEN",
        }
    }

    /// WINDOW_BLUR and TAB_SWITCH often fire together for one physical
    /// focus change, so they share a coalescing window. EXIT_FULLSCREEN
    /// is always counted.
    pub fn is_debounced(&self) -> bool {
        matches!(self, ViolationKind::WindowBlur | ViolationKind::TabSwitch)
    }
}

impl IntegritySignal {
    pub fn violation_kind(&self) -> Option<ViolationKind> {
        match self {
            IntegritySignal::WindowBlur => Some(ViolationKind::WindowBlur),
            IntegritySignal::DocumentHidden => Some(ViolationKind::TabSwitch),
            IntegritySignal::FullscreenExit => Some(ViolationKind::ExitFullscreen),
            _ => None,
        }
    }

    /// Name of the environment event that carried the signal, reported
    /// to the backend as `violation_source`.
    pub fn source_event(&self) -> &'static str {
        match self {
            IntegritySignal::WindowBlur => "blur",
            IntegritySignal::DocumentHidden => "visibilitychange",
            IntegritySignal::FullscreenExit => "fullscreenchange",
            IntegritySignal::KeyCombo(_) => "keydown",
            IntegritySignal::ContextMenu => "contextmenu",
            IntegritySignal::PageUnload => "beforeunload",
        }
    }
}

impl ViolationEvent {
    pub fn new(kind: ViolationKind, source: &str, extra_payload: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source: source.to_string(),
            extra_payload,
            occurred_at: Utc::now(),
        }
    }
}

impl WarningCounter {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    /// Records one violation and returns the new total.
    pub fn record(&mut self) -> u32 {
        self.count += 1;
        self.count
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn limit_reached(&self) -> bool {
        self.count >= self.max
    }
}
