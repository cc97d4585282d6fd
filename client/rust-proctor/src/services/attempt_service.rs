use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::metrics;
use crate::models::api::{LogViolationRequest, SubmitAttemptRequest, SubmitAttemptResponse};
use crate::models::timer::TimerEvent;
use crate::models::violation::{IntegritySignal, ViolationKind, WarningCounter};
use crate::models::{Attempt, AttemptPhase, ForcedReason, OptionLetter, SubmitTrigger};
use crate::services::answer_sync::{AnswerBuffer, FlushOutcome};
use crate::services::api_client::TestApi;
use crate::services::environment::ProctorEnvironment;
use crate::services::integrity_service::{IntegrityMonitor, SignalOutcome};

/// State machine for one proctored attempt. Owns the countdown, the
/// warning tally, the answer buffer, and the one-shot submission latch.
/// All mutation goes through `&mut self`, so phase checks and their
/// follow-up writes never interleave.
pub struct AttemptSession {
    test_id: String,
    api: Arc<TestApi>,
    env: Arc<dyn ProctorEnvironment>,
    phase: AttemptPhase,
    attempt: Option<Attempt>,
    buffer: AnswerBuffer,
    monitor: IntegrityMonitor,
    warnings: WarningCounter,
    submit_latch: SubmitLatch,
    status_check_interval: usize,
    pending_warning: Option<ViolationKind>,
    result: Option<SubmitAttemptResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavTarget {
    Next,
    Prev,
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Moved(usize),
    Ignored,
    /// The publish window closed mid-attempt; submission was forced.
    WindowClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEffect {
    Warned {
        kind: ViolationKind,
        count: u32,
        max: u32,
    },
    ForcedSubmission(ForcedReason),
    InputBlocked(String),
    Suppressed,
    Coalesced(ViolationKind),
    Ignored,
}

/// One-shot guard that resolves races between submission triggers. The
/// first acquire wins; a failed network submission releases it so an
/// explicit retry can reach the backend.
#[derive(Debug, Default)]
struct SubmitLatch(AtomicBool);

impl SubmitLatch {
    fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AttemptSession {
    pub fn new(
        test_id: &str,
        api: Arc<TestApi>,
        env: Arc<dyn ProctorEnvironment>,
        config: &Config,
    ) -> Self {
        Self {
            test_id: test_id.to_string(),
            api,
            env,
            phase: AttemptPhase::Idle,
            attempt: None,
            buffer: AnswerBuffer::new(),
            monitor: IntegrityMonitor::new(Duration::from_millis(config.violation_debounce_ms)),
            warnings: WarningCounter::new(config.max_warnings),
            submit_latch: SubmitLatch::default(),
            status_check_interval: config.status_check_interval,
            pending_warning: None,
            result: None,
        }
    }

    /// Requests attempt creation from the backend. On failure the phase
    /// returns to idle and the caller decides whether to try again.
    pub async fn start(&mut self) -> Result<()> {
        if self.phase != AttemptPhase::Idle {
            bail!("Attempt already started (phase: {})", self.phase.as_str());
        }
        self.phase = AttemptPhase::Loading;

        let start = match self.api.start_attempt(&self.test_id).await {
            Ok(start) => start,
            Err(e) => {
                self.phase = AttemptPhase::Idle;
                metrics::ATTEMPTS_STARTED_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                return Err(e).context("Failed to start attempt");
            }
        };

        if start.questions.is_empty() {
            self.phase = AttemptPhase::Idle;
            metrics::ATTEMPTS_STARTED_TOTAL
                .with_label_values(&["failed"])
                .inc();
            bail!("Backend returned a test with no questions");
        }

        let attempt = Attempt::from_start(&self.test_id, start);
        tracing::info!(
            "Attempt {} started: {} questions, {} seconds on the clock",
            attempt.attempt_id,
            attempt.questions.len(),
            attempt.remaining_seconds
        );
        self.attempt = Some(attempt);
        self.phase = AttemptPhase::Running;
        metrics::ATTEMPTS_STARTED_TOTAL
            .with_label_values(&["started"])
            .inc();
        metrics::ATTEMPTS_ACTIVE.inc();

        if let Err(e) = self.env.request_fullscreen().await {
            tracing::warn!("Fullscreen request failed: {:#}", e);
        }
        Ok(())
    }

    /// Advances the countdown by one second. Outside the running phase
    /// this is a no-op; at zero it forces submission.
    pub async fn tick(&mut self) -> Result<Option<TimerEvent>> {
        if self.phase != AttemptPhase::Running {
            return Ok(None);
        }
        let (attempt_id, remaining, total) = {
            let Some(attempt) = self.attempt.as_mut() else {
                return Ok(None);
            };
            attempt.remaining_seconds = attempt.remaining_seconds.saturating_sub(1);
            (
                attempt.attempt_id.clone(),
                attempt.remaining_seconds,
                attempt.total_seconds,
            )
        };

        if remaining == 0 {
            tracing::info!("Timer reached zero for attempt {}", attempt_id);
            self.submit(SubmitTrigger::Forced(ForcedReason::TimeEnded))
                .await?;
            return Ok(Some(TimerEvent::expired(&attempt_id)));
        }
        Ok(Some(TimerEvent::tick(&attempt_id, remaining, total)))
    }

    /// Records a selection locally and stages it for the next flush.
    /// Returns false when the attempt is not accepting mutations.
    pub fn select_option(&mut self, question_id: &str, choice: OptionLetter) -> bool {
        if self.phase != AttemptPhase::Running {
            tracing::debug!(
                "Selection ignored in phase {}: question={}",
                self.phase.as_str(),
                question_id
            );
            return false;
        }
        let Some(attempt) = self.attempt.as_mut() else {
            return false;
        };
        if attempt.question(question_id).is_none() {
            tracing::warn!("Selection for unknown question {}", question_id);
            return false;
        }
        attempt.answers.insert(question_id.to_string(), choice);
        self.buffer.stage(question_id, choice);
        true
    }

    /// Moves the current question. The pending selection is flushed
    /// before the index changes; every N-th landing re-checks that the
    /// test is still live.
    pub async fn navigate(&mut self, target: NavTarget) -> Result<NavigationOutcome> {
        if self.phase != AttemptPhase::Running {
            return Ok(NavigationOutcome::Ignored);
        }
        let (current, len) = {
            let Some(attempt) = self.attempt.as_ref() else {
                return Ok(NavigationOutcome::Ignored);
            };
            (attempt.current_index, attempt.questions.len())
        };
        let Some(next_index) = Self::resolve_target(current, len, target) else {
            return Ok(NavigationOutcome::Ignored);
        };

        self.flush_pending().await;
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.current_index = next_index;
        }

        if next_index != 0 && next_index % self.status_check_interval == 0 {
            match self.api.test_status(&self.test_id).await {
                Ok(status) if !status.is_live => {
                    metrics::STATUS_CHECKS_TOTAL
                        .with_label_values(&["closed"])
                        .inc();
                    tracing::warn!("Test is no longer live; forcing submission");
                    self.submit(SubmitTrigger::Forced(ForcedReason::PublishWindowEnded))
                        .await?;
                    return Ok(NavigationOutcome::WindowClosed);
                }
                Ok(_) => {
                    metrics::STATUS_CHECKS_TOTAL
                        .with_label_values(&["live"])
                        .inc();
                }
                Err(e) => {
                    metrics::STATUS_CHECKS_TOTAL
                        .with_label_values(&["error"])
                        .inc();
                    tracing::warn!("Status check failed, attempt continues: {}", e);
                }
            }
        }
        Ok(NavigationOutcome::Moved(next_index))
    }

    /// Routes one environment signal through the integrity monitor and
    /// applies the consequence: warning, escalation, or suppression.
    pub async fn handle_signal(&mut self, signal: IntegritySignal) -> Result<SignalEffect> {
        if self.phase != AttemptPhase::Running {
            tracing::debug!("Signal ignored in phase {}: {:?}", self.phase.as_str(), signal);
            return Ok(SignalEffect::Ignored);
        }

        match self.monitor.observe(signal) {
            SignalOutcome::KeyBlocked(combo) => {
                self.env
                    .show_notice(&format!("{} is disabled during the test", combo));
                Ok(SignalEffect::InputBlocked(combo))
            }
            SignalOutcome::MenuSuppressed => Ok(SignalEffect::Suppressed),
            SignalOutcome::UnloadRequested => {
                tracing::warn!("Page unload during a running attempt; forcing submission");
                self.submit(SubmitTrigger::Forced(ForcedReason::PageUnload))
                    .await?;
                Ok(SignalEffect::ForcedSubmission(ForcedReason::PageUnload))
            }
            SignalOutcome::Coalesced(kind) => Ok(SignalEffect::Coalesced(kind)),
            SignalOutcome::Violation(event) => {
                let kind = event.kind;
                let count = self.warnings.record();
                tracing::warn!(
                    "Integrity violation {}: warning {} of {}",
                    kind.as_str(),
                    count,
                    self.warnings.max()
                );
                if let Some(attempt) = self.attempt.as_ref() {
                    self.api
                        .log_violation_detached(LogViolationRequest::from_event(
                            &attempt.attempt_id,
                            &event,
                        ));
                }

                if self.warnings.limit_reached() {
                    let reason = ForcedReason::ViolationLimit(kind);
                    self.submit(SubmitTrigger::Forced(reason)).await?;
                    Ok(SignalEffect::ForcedSubmission(reason))
                } else {
                    if kind == ViolationKind::ExitFullscreen {
                        if let Err(e) = self.env.request_fullscreen().await {
                            tracing::warn!("Fullscreen re-request failed: {:#}", e);
                        }
                    }
                    self.pending_warning = Some(kind);
                    Ok(SignalEffect::Warned {
                        kind,
                        count,
                        max: self.warnings.max(),
                    })
                }
            }
        }
    }

    /// Dismisses the blocking warning overlay and re-enters fullscreen.
    /// Returns false when no warning was pending.
    pub async fn acknowledge_warning(&mut self) -> bool {
        if self.pending_warning.take().is_none() {
            return false;
        }
        if self.phase == AttemptPhase::Running {
            if let Err(e) = self.env.request_fullscreen().await {
                tracing::warn!("Fullscreen re-request failed: {:#}", e);
            }
        }
        true
    }

    /// Submits the attempt exactly once. Duplicate triggers return None
    /// without touching the network; only a confirmed response moves the
    /// phase to terminated.
    pub async fn submit(&mut self, trigger: SubmitTrigger) -> Result<Option<SubmitAttemptResponse>> {
        match self.phase {
            AttemptPhase::Idle | AttemptPhase::Loading => {
                tracing::debug!("No running attempt to submit");
                return Ok(None);
            }
            AttemptPhase::Terminated => {
                tracing::debug!("Submission trigger after termination ignored");
                return Ok(None);
            }
            AttemptPhase::Running | AttemptPhase::Submitting => {}
        }
        if !self.submit_latch.try_acquire() {
            tracing::debug!(
                "Duplicate submission trigger ignored: {}",
                trigger.reason_label()
            );
            return Ok(None);
        }
        self.phase = AttemptPhase::Submitting;
        tracing::info!("Submitting attempt: trigger={}", trigger.reason_label());

        let Some(attempt_id) = self.attempt.as_ref().map(|a| a.attempt_id.clone()) else {
            self.submit_latch.release();
            bail!("Submission requested without an active attempt");
        };

        // Last staged answer rides along before the grade is fixed
        self.flush_pending().await;

        if let Err(e) = self.env.exit_fullscreen().await {
            tracing::warn!("Fullscreen release failed: {:#}", e);
        }

        let request = SubmitAttemptRequest {
            attempt_id: attempt_id.clone(),
            forced_submission: trigger.forced_flag(),
        };
        match self.api.submit_attempt(&self.test_id, &request).await {
            Ok(result) => {
                self.phase = AttemptPhase::Terminated;
                self.pending_warning = None;
                metrics::ATTEMPTS_ACTIVE.dec();
                let mode = if trigger.is_forced() { "forced" } else { "manual" };
                metrics::SUBMISSIONS_TOTAL.with_label_values(&[mode]).inc();
                tracing::info!(
                    "Attempt {} submitted: {:.1}% ({})",
                    attempt_id,
                    result.percentage,
                    if result.pass_status { "pass" } else { "fail" }
                );
                self.result = Some(result.clone());
                Ok(Some(result))
            }
            Err(e) => {
                // Leave the phase at submitting; release the latch so an
                // explicit retry can go out
                self.submit_latch.release();
                Err(e).context("Failed to submit attempt")
            }
        }
    }

    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    pub fn attempt(&self) -> Option<&Attempt> {
        self.attempt.as_ref()
    }

    pub fn result(&self) -> Option<&SubmitAttemptResponse> {
        self.result.as_ref()
    }

    pub fn warning_count(&self) -> u32 {
        self.warnings.count()
    }

    pub fn max_warnings(&self) -> u32 {
        self.warnings.max()
    }

    pub fn pending_warning(&self) -> Option<ViolationKind> {
        self.pending_warning
    }

    pub fn has_pending_answer(&self) -> bool {
        self.buffer.has_pending()
    }

    async fn flush_pending(&mut self) -> FlushOutcome {
        let Some((test_id, attempt_id)) = self
            .attempt
            .as_ref()
            .map(|a| (a.test_id.clone(), a.attempt_id.clone()))
        else {
            return FlushOutcome::Empty;
        };
        self.buffer.flush(&self.api, &test_id, &attempt_id).await
    }

    fn resolve_target(current: usize, len: usize, target: NavTarget) -> Option<usize> {
        let index = match target {
            NavTarget::Next => current.checked_add(1)?,
            NavTarget::Prev => current.checked_sub(1)?,
            NavTarget::Index(index) => index,
        };
        (index < len).then_some(index)
    }
}
