use std::time::{Duration, Instant};

use crate::metrics;
use crate::models::violation::{IntegritySignal, ViolationEvent, ViolationKind};

/// Classifies raw environment signals into violations, coalesced
/// duplicates, and non-counted interceptions. Holds only the debounce
/// clock; warning escalation lives with the attempt state machine.
pub struct IntegrityMonitor {
    debounce_window: Duration,
    last_counted_at: Option<Instant>,
}

#[derive(Debug)]
pub enum SignalOutcome {
    /// Counted violation; the caller escalates and reports it.
    Violation(ViolationEvent),
    /// Same physical event as a just-counted violation; dropped.
    Coalesced(ViolationKind),
    /// Blocked key combination; input suppressed, nothing counted.
    KeyBlocked(String),
    /// Context menu suppressed silently.
    MenuSuppressed,
    /// The page is being torn down; the caller must force-submit.
    UnloadRequested,
}

impl IntegrityMonitor {
    pub fn new(debounce_window: Duration) -> Self {
        Self {
            debounce_window,
            last_counted_at: None,
        }
    }

    pub fn observe(&mut self, signal: IntegritySignal) -> SignalOutcome {
        self.observe_at(signal, Instant::now())
    }

    fn observe_at(&mut self, signal: IntegritySignal, now: Instant) -> SignalOutcome {
        let kind = match &signal {
            IntegritySignal::KeyCombo(combo) => {
                tracing::debug!("Blocked key combination: {}", combo);
                return SignalOutcome::KeyBlocked(combo.clone());
            }
            IntegritySignal::ContextMenu => {
                tracing::debug!("Context menu suppressed");
                return SignalOutcome::MenuSuppressed;
            }
            IntegritySignal::PageUnload => {
                return SignalOutcome::UnloadRequested;
            }
            IntegritySignal::WindowBlur => ViolationKind::WindowBlur,
            IntegritySignal::DocumentHidden => ViolationKind::TabSwitch,
            IntegritySignal::FullscreenExit => ViolationKind::ExitFullscreen,
        };

        // Blur and visibility-change both fire for one focus loss; only
        // the first within the window counts. Fullscreen exits bypass
        // the window entirely.
        if kind.is_debounced() {
            if let Some(last) = self.last_counted_at {
                if now.duration_since(last) < self.debounce_window {
                    metrics::VIOLATIONS_COALESCED_TOTAL
                        .with_label_values(&[kind.as_str()])
                        .inc();
                    tracing::debug!("Coalesced duplicate signal: {}", kind.as_str());
                    return SignalOutcome::Coalesced(kind);
                }
            }
            self.last_counted_at = Some(now);
        }

        metrics::INTEGRITY_VIOLATIONS_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
        SignalOutcome::Violation(ViolationEvent::new(kind, signal.source_event(), None))
    }
}
