use tracing_subscriber::fmt::init;

use placement_proctor::config::Config;
use placement_proctor::services::readiness_service::ReadinessService;
use placement_proctor::utils::format::format_mbps;

/// One-shot connection probe against the configured reference resource.
/// Exits non-zero when the measured speed would block an attempt.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();

    let config = Config::load().expect("Failed to load configuration");
    let readiness = ReadinessService::new(&config);

    let report = readiness.check_readiness().await;
    println!(
        "probe: {}\nspeed: {}\nminimum: {:.2} Mbps\nverdict: {}",
        config.speed_probe_url,
        format_mbps(report.speed_mbps),
        config.min_speed_mbps,
        if report.status.is_ok() { "ok" } else { "slow" }
    );

    if !report.status.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
