use reqwest::{Client, Response};
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::metrics;
use crate::models::api::{
    AnswerWriteRequest, LogViolationRequest, StartAttemptResponse, SubmitAttemptRequest,
    SubmitAttemptResponse, TestStatusResponse,
};

/// Client for the placement-training student endpoints. Every call is a
/// single request; retry policy belongs to the caller, not this layer.
pub struct TestApi {
    http: Client,
    base_url: String,
    bearer_token: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },
}

impl TestApi {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.api_base_url.clone(),
            bearer_token: config.bearer_token.clone(),
        }
    }

    pub async fn start_attempt(&self, test_id: &str) -> Result<StartAttemptResponse, ApiError> {
        let url = self.endpoint_url(test_id, "start");
        metrics::track_api_call("start", async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.bearer_token)
                .send()
                .await?;
            let response = Self::ensure_success(response).await?;
            Ok(response.json::<StartAttemptResponse>().await?)
        })
        .await
    }

    pub async fn test_status(&self, test_id: &str) -> Result<TestStatusResponse, ApiError> {
        let url = self.endpoint_url(test_id, "status");
        metrics::track_api_call("status", async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.bearer_token)
                .send()
                .await?;
            let response = Self::ensure_success(response).await?;
            Ok(response.json::<TestStatusResponse>().await?)
        })
        .await
    }

    pub async fn write_answer(
        &self,
        test_id: &str,
        request: &AnswerWriteRequest,
    ) -> Result<(), ApiError> {
        let url = self.endpoint_url(test_id, "answer");
        metrics::track_api_call("answer", async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.bearer_token)
                .json(request)
                .send()
                .await?;
            Self::ensure_success(response).await?;
            Ok(())
        })
        .await
    }

    // Unlike the other calls this one is not scoped to a test id; the
    // attempt id in the body identifies the sitting.
    pub async fn log_violation(&self, request: &LogViolationRequest) -> Result<(), ApiError> {
        let url = format!(
            "{}/placement-training/student/tests/log-violation",
            self.base_url
        );
        metrics::track_api_call("log-violation", async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.bearer_token)
                .json(request)
                .send()
                .await?;
            Self::ensure_success(response).await?;
            Ok(())
        })
        .await
    }

    /// Hands the violation log to a background task. The attempt flow
    /// never waits on this delivery and never observes its failure.
    pub fn log_violation_detached(self: &Arc<Self>, request: LogViolationRequest) {
        let api = Arc::clone(self);
        tokio::spawn(async move {
            match api.log_violation(&request).await {
                Ok(()) => {
                    metrics::VIOLATION_LOGS_TOTAL
                        .with_label_values(&["sent"])
                        .inc();
                    tracing::debug!(
                        "Violation log delivered: type={}",
                        request.violation_type.as_str()
                    );
                }
                Err(e) => {
                    metrics::VIOLATION_LOGS_TOTAL
                        .with_label_values(&["failed"])
                        .inc();
                    tracing::warn!(
                        "Failed to deliver violation log: type={}, error={}",
                        request.violation_type.as_str(),
                        e
                    );
                }
            }
        });
    }

    pub async fn submit_attempt(
        &self,
        test_id: &str,
        request: &SubmitAttemptRequest,
    ) -> Result<SubmitAttemptResponse, ApiError> {
        let url = self.endpoint_url(test_id, "submit");
        metrics::track_api_call("submit", async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.bearer_token)
                .json(request)
                .send()
                .await?;
            let response = Self::ensure_success(response).await?;
            Ok(response.json::<SubmitAttemptResponse>().await?)
        })
        .await
    }

    fn endpoint_url(&self, test_id: &str, action: &str) -> String {
        format!(
            "{}/placement-training/student/tests/{}/{}",
            self.base_url, test_id, action
        )
    }

    async fn ensure_success(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        // Backends wrap human-readable errors as {"message": "..."}
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .or_else(|| {
                if body.trim().is_empty() {
                    None
                } else {
                    Some(body.clone())
                }
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        Err(ApiError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}
