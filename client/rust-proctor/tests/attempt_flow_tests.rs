mod common;

use std::sync::Arc;

use placement_proctor::models::timer::TimerEvent;
use placement_proctor::models::violation::IntegritySignal;
use placement_proctor::models::{AttemptPhase, ForcedReason, OptionLetter, SubmitTrigger};
use placement_proctor::services::attempt_service::{NavTarget, NavigationOutcome, SignalEffect};

#[tokio::test]
async fn test_full_attempt_flow() {
    let (base_url, backend) = common::spawn_backend().await;
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env.clone());

    session.start().await.expect("start should succeed");
    assert_eq!(session.phase(), AttemptPhase::Running);
    let attempt = session.attempt().expect("attempt should be loaded");
    assert_eq!(attempt.attempt_id, "att-123");
    assert_eq!(attempt.questions.len(), 3);
    assert_eq!(attempt.remaining_seconds, 300);
    // Starting pushed the shell into fullscreen
    assert!(env.fullscreen_requests.load(std::sync::atomic::Ordering::SeqCst) >= 1);

    assert!(session.select_option("q1", OptionLetter::A));
    let moved = session.navigate(NavTarget::Next).await.unwrap();
    assert_eq!(moved, NavigationOutcome::Moved(1));

    {
        let state = backend.lock().unwrap();
        assert_eq!(state.answers.len(), 1);
        assert_eq!(state.answers[0]["question_id"], "q1");
        assert_eq!(state.answers[0]["selected_option"], "A");
        assert_eq!(state.answers[0]["attempt_id"], "att-123");
    }

    assert!(session.select_option("q2", OptionLetter::C));
    let result = session
        .submit(SubmitTrigger::Manual)
        .await
        .expect("submission should succeed")
        .expect("first trigger should reach the backend");
    assert!((result.percentage - 66.67).abs() < 1e-9);
    assert!(result.pass_status);
    assert_eq!(session.phase(), AttemptPhase::Terminated);

    let state = backend.lock().unwrap();
    // The staged q2 answer was flushed before the submit request
    assert_eq!(state.answers.len(), 2);
    assert_eq!(state.answers[1]["question_id"], "q2");
    assert_eq!(state.answers[1]["selected_option"], "C");
    assert_eq!(state.submissions.len(), 1);
    assert_eq!(state.submissions[0]["forced_submission"], 0);
    assert_eq!(state.submissions[0]["attempt_id"], "att-123");
}

#[tokio::test]
async fn test_bearer_token_attached_to_requests() {
    let (base_url, backend) = common::spawn_backend().await;
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env);

    session.start().await.unwrap();

    let state = backend.lock().unwrap();
    assert_eq!(
        state.last_authorization.as_deref(),
        Some("Bearer student-token")
    );
}

#[tokio::test]
async fn test_time_expiry_forces_submission_with_pending_answer() {
    let (base_url, backend) = common::spawn_backend().await;
    backend.lock().unwrap().remaining_seconds = 2;
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env);

    session.start().await.unwrap();
    assert!(session.select_option("q1", OptionLetter::B));
    assert!(session.has_pending_answer());

    let first = session.tick().await.unwrap();
    assert!(matches!(
        first,
        Some(TimerEvent::TimerTick(ref tick)) if tick.remaining_seconds == 1
    ));

    let second = session.tick().await.unwrap();
    assert!(matches!(second, Some(TimerEvent::TimeExpired(_))));
    assert_eq!(session.phase(), AttemptPhase::Terminated);
    assert!(!session.has_pending_answer());

    {
        let state = backend.lock().unwrap();
        // The staged answer rode along ahead of the forced submission
        assert_eq!(state.answers.len(), 1);
        assert_eq!(state.answers[0]["question_id"], "q1");
        assert_eq!(state.submissions.len(), 1);
        assert_eq!(state.submissions[0]["forced_submission"], 1);
    }

    // The countdown is dead after termination
    let after = session.tick().await.unwrap();
    assert!(after.is_none());
}

#[tokio::test]
async fn test_duplicate_submission_triggers_hit_backend_once() {
    let (base_url, backend) = common::spawn_backend().await;
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env);

    session.start().await.unwrap();
    let first = session.submit(SubmitTrigger::Manual).await.unwrap();
    assert!(first.is_some());

    let second = session.submit(SubmitTrigger::Manual).await.unwrap();
    assert!(second.is_none());
    let third = session
        .submit(SubmitTrigger::Forced(ForcedReason::TimeEnded))
        .await
        .unwrap();
    assert!(third.is_none());

    assert_eq!(backend.lock().unwrap().submissions.len(), 1);
}

#[tokio::test]
async fn test_terminated_attempt_ignores_all_mutations() {
    let (base_url, backend) = common::spawn_backend().await;
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env);

    session.start().await.unwrap();
    session.submit(SubmitTrigger::Manual).await.unwrap();
    assert_eq!(session.phase(), AttemptPhase::Terminated);

    assert!(!session.select_option("q1", OptionLetter::A));
    assert_eq!(
        session.navigate(NavTarget::Next).await.unwrap(),
        NavigationOutcome::Ignored
    );
    let effect = session
        .handle_signal(IntegritySignal::WindowBlur)
        .await
        .unwrap();
    assert_eq!(effect, SignalEffect::Ignored);
    assert_eq!(session.warning_count(), 0);

    let state = backend.lock().unwrap();
    assert_eq!(state.answers.len(), 0);
    assert_eq!(state.violations.len(), 0);
    assert_eq!(state.submissions.len(), 1);
}

#[tokio::test]
async fn test_start_failure_returns_to_idle_for_retry() {
    let (base_url, backend) = common::spawn_backend().await;
    backend.lock().unwrap().fail_start = true;
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env);

    let err = session.start().await.expect_err("start should fail");
    assert!(format!("{:#}", err).contains("Test is not live"));
    assert_eq!(session.phase(), AttemptPhase::Idle);
    assert!(session.attempt().is_none());

    // A later explicit retry goes through
    backend.lock().unwrap().fail_start = false;
    session.start().await.expect("retry should succeed");
    assert_eq!(session.phase(), AttemptPhase::Running);
    assert_eq!(backend.lock().unwrap().start_calls, 2);
}

#[tokio::test]
async fn test_empty_question_paper_is_rejected() {
    let (base_url, backend) = common::spawn_backend().await;
    backend.lock().unwrap().question_count = 0;
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env);

    let err = session.start().await.expect_err("start should fail");
    assert!(format!("{:#}", err).contains("no questions"));
    assert_eq!(session.phase(), AttemptPhase::Idle);
}

#[tokio::test]
async fn test_failed_submission_allows_explicit_retry() {
    let (base_url, backend) = common::spawn_backend().await;
    backend.lock().unwrap().fail_submit = true;
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env);

    session.start().await.unwrap();
    let err = session
        .submit(SubmitTrigger::Manual)
        .await
        .expect_err("submission should fail");
    assert!(format!("{:#}", err).contains("submission rejected"));
    // Still submitting, not terminated: the outcome is unknown until a
    // success response lands
    assert_eq!(session.phase(), AttemptPhase::Submitting);

    backend.lock().unwrap().fail_submit = false;
    let result = session.submit(SubmitTrigger::Manual).await.unwrap();
    assert!(result.is_some());
    assert_eq!(session.phase(), AttemptPhase::Terminated);
    assert_eq!(backend.lock().unwrap().submissions.len(), 2);
}

#[tokio::test]
async fn test_status_check_closes_publish_window() {
    let (base_url, backend) = common::spawn_backend().await;
    {
        let mut state = backend.lock().unwrap();
        state.question_count = 8;
        state.is_live = false;
    }
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env);

    session.start().await.unwrap();
    // Off-interval landings never consult the backend
    assert_eq!(
        session.navigate(NavTarget::Index(3)).await.unwrap(),
        NavigationOutcome::Moved(3)
    );
    assert_eq!(backend.lock().unwrap().status_calls, 0);

    let outcome = session.navigate(NavTarget::Index(5)).await.unwrap();
    assert_eq!(outcome, NavigationOutcome::WindowClosed);
    assert_eq!(session.phase(), AttemptPhase::Terminated);

    let state = backend.lock().unwrap();
    assert_eq!(state.status_calls, 1);
    assert_eq!(state.submissions.len(), 1);
    assert_eq!(state.submissions[0]["forced_submission"], 1);
}

#[tokio::test]
async fn test_status_check_failure_keeps_attempt_alive() {
    let (base_url, backend) = common::spawn_backend().await;
    {
        let mut state = backend.lock().unwrap();
        state.question_count = 8;
        state.fail_status = true;
    }
    let config = common::test_config(&base_url);
    let env = Arc::new(common::RecordingEnvironment::default());
    let mut session = common::new_session("t-1", &config, env);

    session.start().await.unwrap();
    let outcome = session.navigate(NavTarget::Index(5)).await.unwrap();
    assert_eq!(outcome, NavigationOutcome::Moved(5));
    assert_eq!(session.phase(), AttemptPhase::Running);
    assert_eq!(backend.lock().unwrap().status_calls, 1);
    assert_eq!(backend.lock().unwrap().submissions.len(), 0);
}
