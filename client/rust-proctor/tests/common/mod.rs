use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use placement_proctor::config::Config;
use placement_proctor::services::api_client::TestApi;
use placement_proctor::services::attempt_service::AttemptSession;
use placement_proctor::services::environment::ProctorEnvironment;

/// Scriptable stand-in for the college ERP backend. Tests flip the
/// `fail_*` switches and inspect the recorded request bodies.
#[derive(Debug)]
pub struct BackendState {
    pub is_live: bool,
    pub remaining_seconds: u32,
    pub question_count: usize,
    pub fail_start: bool,
    pub fail_status: bool,
    pub fail_answers: bool,
    pub fail_violations: bool,
    pub fail_submit: bool,
    pub answer_delay_ms: u64,
    pub probe_delay_ms: u64,
    pub probe_size_bytes: usize,
    pub start_calls: usize,
    pub status_calls: usize,
    pub answers: Vec<Value>,
    pub violations: Vec<Value>,
    pub submissions: Vec<Value>,
    pub last_authorization: Option<String>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            is_live: true,
            remaining_seconds: 300,
            question_count: 3,
            fail_start: false,
            fail_status: false,
            fail_answers: false,
            fail_violations: false,
            fail_submit: false,
            answer_delay_ms: 0,
            probe_delay_ms: 0,
            probe_size_bytes: 256 * 1024,
            start_calls: 0,
            status_calls: 0,
            answers: Vec::new(),
            violations: Vec::new(),
            submissions: Vec::new(),
            last_authorization: None,
        }
    }
}

pub type SharedBackend = Arc<Mutex<BackendState>>;

/// Counts environment calls instead of performing them.
#[derive(Debug, Default)]
pub struct RecordingEnvironment {
    pub fullscreen_requests: AtomicUsize,
    pub fullscreen_exits: AtomicUsize,
    pub notices: Mutex<Vec<String>>,
}

#[async_trait]
impl ProctorEnvironment for RecordingEnvironment {
    async fn request_fullscreen(&self) -> anyhow::Result<()> {
        self.fullscreen_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exit_fullscreen(&self) -> anyhow::Result<()> {
        self.fullscreen_exits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn show_notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

pub async fn spawn_backend() -> (String, SharedBackend) {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let state: SharedBackend = Arc::new(Mutex::new(BackendState::default()));
    let router = Router::new()
        .route(
            "/placement-training/student/tests/{test_id}/start",
            post(start_attempt),
        )
        .route(
            "/placement-training/student/tests/{test_id}/status",
            get(test_status),
        )
        .route(
            "/placement-training/student/tests/{test_id}/answer",
            post(write_answer),
        )
        .route(
            "/placement-training/student/tests/log-violation",
            post(log_violation),
        )
        .route(
            "/placement-training/student/tests/{test_id}/submit",
            post(submit_attempt),
        )
        .route("/placement-training/public/netcheck.bin", get(netcheck))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock backend");
    let addr = listener.local_addr().expect("Mock backend has no address");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Mock backend crashed");
    });

    (format!("http://{}", addr), state)
}

/// Config tuned for tests: no reading delay, a short debounce window,
/// and a speed floor any loopback transfer clears.
pub fn test_config(base_url: &str) -> Config {
    Config {
        api_base_url: base_url.to_string(),
        bearer_token: "student-token".to_string(),
        speed_probe_url: format!("{}/placement-training/public/netcheck.bin", base_url),
        min_speed_mbps: 0.001,
        speed_probe_timeout_secs: 2,
        reading_delay_secs: 0,
        max_warnings: 3,
        violation_debounce_ms: 80,
        status_check_interval: 5,
    }
}

pub fn new_session(
    test_id: &str,
    config: &Config,
    env: Arc<RecordingEnvironment>,
) -> AttemptSession {
    AttemptSession::new(test_id, Arc::new(TestApi::new(config)), env, config)
}

/// Polls for work handed to background tasks (violation logs).
pub async fn wait_until<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..50 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

async fn start_attempt(
    State(state): State<SharedBackend>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().unwrap();
    s.start_calls += 1;
    s.last_authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if s.fail_start {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Test is not live" })),
        );
    }
    let questions: Vec<Value> = (1..=s.question_count)
        .map(|n| {
            json!({
                "question_id": format!("q{}", n),
                "question": format!("Question number {}", n),
                "option_a": "alpha",
                "option_b": "bravo",
                "option_c": "charlie",
                "option_d": "delta",
            })
        })
        .collect();
    (
        StatusCode::OK,
        Json(json!({
            "attempt_id": "att-123",
            "questions": questions,
            "remaining_seconds": s.remaining_seconds,
        })),
    )
}

async fn test_status(State(state): State<SharedBackend>) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().unwrap();
    s.status_calls += 1;
    if s.fail_status {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "status unavailable" })),
        );
    }
    (StatusCode::OK, Json(json!({ "is_live": s.is_live })))
}

async fn write_answer(
    State(state): State<SharedBackend>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let (fail, delay_ms) = {
        let mut s = state.lock().unwrap();
        s.answers.push(body);
        (s.fail_answers, s.answer_delay_ms)
    };
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    if fail {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "answer write failed" })),
        );
    }
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn log_violation(
    State(state): State<SharedBackend>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().unwrap();
    s.violations.push(body);
    if s.fail_violations {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "log rejected" })),
        );
    }
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn submit_attempt(
    State(state): State<SharedBackend>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().unwrap();
    s.submissions.push(body);
    if s.fail_submit {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "submission rejected" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "percentage": 66.67, "pass_status": true })),
    )
}

async fn netcheck(State(state): State<SharedBackend>) -> Vec<u8> {
    let (delay_ms, size) = {
        let s = state.lock().unwrap();
        (s.probe_delay_ms, s.probe_size_bytes)
    };
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    vec![0u8; size]
}
