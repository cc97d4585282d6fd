use std::sync::Arc;

use crate::config::Config;
use crate::services::api_client::TestApi;
use crate::services::attempt_service::AttemptSession;
use crate::services::environment::ProctorEnvironment;
use crate::services::readiness_service::ReadinessService;

/// Shared dependencies for everything driving an attempt: the backend
/// client, the host environment, and the loaded configuration.
pub struct ProctorContext {
    pub config: Config,
    pub api: Arc<TestApi>,
    pub env: Arc<dyn ProctorEnvironment>,
}

impl ProctorContext {
    pub fn new(config: Config, env: Arc<dyn ProctorEnvironment>) -> Self {
        let api = Arc::new(TestApi::new(&config));
        Self { config, api, env }
    }

    pub fn session(&self, test_id: &str) -> AttemptSession {
        AttemptSession::new(
            test_id,
            Arc::clone(&self.api),
            Arc::clone(&self.env),
            &self.config,
        )
    }

    pub fn readiness(&self) -> ReadinessService {
        ReadinessService::new(&self.config)
    }
}

pub mod answer_sync;
pub mod api_client;
pub mod attempt_service;
pub mod environment;
pub mod integrity_service;
pub mod readiness_service;
