use serde::Deserialize;
use std::env;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_base_url: String,
    pub bearer_token: String,
    pub speed_probe_url: String,
    pub min_speed_mbps: f64,
    pub speed_probe_timeout_secs: u64,
    pub reading_delay_secs: u64,
    pub max_warnings: u32,
    pub violation_debounce_ms: u64,
    pub status_check_interval: usize,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            // Fallback to current directory .env for backward compatibility
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            // Load base config from TOML file
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        // Extract values with fallbacks to ENV or defaults
        let api_base_url = settings
            .get_string("api.base_url")
            .or_else(|_| env::var("API_BASE_URL"))
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let api_base_url = Url::parse(&api_base_url)
            .map_err(|e| {
                config::ConfigError::Message(format!("invalid api.base_url '{}': {}", api_base_url, e))
            })?
            .to_string()
            .trim_end_matches('/')
            .to_string();

        let bearer_token = settings
            .get_string("auth.bearer_token")
            .or_else(|_| env::var("STUDENT_BEARER_TOKEN"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: STUDENT_BEARER_TOKEN must be set in production!");
                }
                eprintln!("WARNING: Using placeholder bearer token (dev mode only!)");
                "dev-token-only-for-local-testing".to_string()
            });

        let speed_probe_url = settings
            .get_string("probe.url")
            .or_else(|_| env::var("SPEED_PROBE_URL"))
            .unwrap_or_else(|_| {
                format!("{}/placement-training/public/netcheck.bin", api_base_url)
            });

        let min_speed_mbps = settings
            .get_float("probe.min_speed_mbps")
            .ok()
            .or_else(|| env::var("MIN_SPEED_MBPS").ok().and_then(|v| v.parse().ok()))
            .filter(|&v| v > 0.0)
            .unwrap_or(2.0);

        let speed_probe_timeout_secs = settings
            .get_int("probe.timeout_secs")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .or_else(|| {
                env::var("SPEED_PROBE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|&v| v > 0)
            .unwrap_or(8);

        let reading_delay_secs = settings
            .get_int("attempt.reading_delay_secs")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .or_else(|| env::var("READING_DELAY_SECS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(10);

        let max_warnings = settings
            .get_int("attempt.max_warnings")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .or_else(|| env::var("MAX_WARNINGS").ok().and_then(|v| v.parse().ok()))
            .filter(|&v| v > 0)
            .unwrap_or(3);

        let violation_debounce_ms = settings
            .get_int("attempt.violation_debounce_ms")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .or_else(|| {
                env::var("VIOLATION_DEBOUNCE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(1500);

        let status_check_interval = settings
            .get_int("attempt.status_check_interval")
            .ok()
            .and_then(|v| usize::try_from(v).ok())
            .or_else(|| {
                env::var("STATUS_CHECK_INTERVAL")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|&v| v > 0)
            .unwrap_or(5);

        Ok(Config {
            api_base_url,
            bearer_token,
            speed_probe_url,
            min_speed_mbps,
            speed_probe_timeout_secs,
            reading_delay_secs,
            max_warnings,
            violation_debounce_ms,
            status_check_interval,
        })
    }
}
