use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!("recognition_requests_total", "Vision service calls by outcome");
    describe_histogram!(
        "recognition_duration_seconds",
        Unit::Seconds,
        "Latency of a single vision service call"
    );
    describe_counter!("analysis_runs_total", "Analysis runs by final status");
    describe_counter!("analysis_scores_saved_total", "Scores persisted by analysis runs");
    describe_counter!("analysis_papers_discarded_total", "Papers dropped during analysis");
    describe_counter!("http_requests_total", "HTTP responses by status");
}
