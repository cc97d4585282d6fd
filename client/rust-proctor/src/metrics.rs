use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // Backend API Metrics
    pub static ref API_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "api_calls_total",
        "Total number of backend API calls",
        &["endpoint", "status"]
    )
    .unwrap();

    pub static ref API_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "api_call_duration_seconds",
        "Backend API call duration in seconds",
        &["endpoint"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Attempt Metrics
    pub static ref ATTEMPTS_STARTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_started_total",
        "Total number of attempt start requests",
        &["status"]
    )
    .unwrap();

    pub static ref ATTEMPTS_ACTIVE: IntGauge = register_int_gauge!(
        "attempts_active",
        "Number of currently running attempts"
    )
    .unwrap();

    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_total",
        "Total number of completed submissions",
        &["mode"]
    )
    .unwrap();

    pub static ref STATUS_CHECKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "status_checks_total",
        "Total number of publish-window status checks",
        &["result"]
    )
    .unwrap();

    // Integrity Metrics
    pub static ref INTEGRITY_VIOLATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "integrity_violations_total",
        "Total number of counted integrity violations",
        &["violation_type"]
    )
    .unwrap();

    pub static ref VIOLATIONS_COALESCED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "violations_coalesced_total",
        "Total number of violation signals dropped by the debounce window",
        &["violation_type"]
    )
    .unwrap();

    pub static ref VIOLATION_LOGS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "violation_logs_total",
        "Total number of violation log deliveries",
        &["status"]
    )
    .unwrap();

    // Answer Sync Metrics
    pub static ref ANSWER_FLUSHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answer_flushes_total",
        "Total number of pending answer flushes",
        &["status"]
    )
    .unwrap();

    // Readiness Metrics
    pub static ref READINESS_CHECKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "readiness_checks_total",
        "Total number of connection readiness checks",
        &["status"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a backend API call with metrics
pub async fn track_api_call<F, T, E>(endpoint: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    API_CALLS_TOTAL
        .with_label_values(&[endpoint, status])
        .inc();

    API_CALL_DURATION_SECONDS
        .with_label_values(&[endpoint])
        .observe(duration);

    result
}
