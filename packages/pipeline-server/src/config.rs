//! Process-level configuration: one `clap::Parser` struct covering every
//! environment knob in spec §6.7, plus conversions into the layer-specific
//! config types (`HttpConfig`, `SessionConfig`).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::network::HttpConfig;
use crate::session::SessionConfig;
use crate::worker::{StageSpec, STAGE_A, STAGE_B};

/// All tunables, sourced from CLI flags or their matching environment
/// variable (§6.7). Flags win over the environment; both fall back to the
/// defaults below.
#[derive(Debug, Clone, Parser)]
#[command(name = "pipeline-server", about = "Two-stage national ID validation pipeline")]
pub struct PipelineConfig {
    /// `HOST` (§6.7).
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// `PORT` (§6.7).
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// `HEADLESS` (§6.7): run drivers without a visible browser window.
    #[arg(long, env = "HEADLESS", default_value_t = true)]
    pub headless: bool,

    /// `MAX_GLOBAL_WORKERS` (§6.7, §4.6).
    #[arg(long, env = "MAX_GLOBAL_WORKERS", default_value_t = 10)]
    pub max_global_workers: u32,

    /// `SESSION_IDLE_TIMEOUT` in seconds (§6.7, §4.6).
    #[arg(long, env = "SESSION_IDLE_TIMEOUT", default_value_t = 1800)]
    pub session_idle_timeout_secs: u64,

    /// Per-stage `max-retries` knob for Stage A's `Error-A` records (§6.7).
    /// Unset means unlimited.
    #[arg(long, env = "MAX_RETRIES_A")]
    pub max_retries_a: Option<u32>,

    /// Per-stage `max-retries` knob for Stage B's `Error-B`/`Not-Found`
    /// records (§6.7). Unset means unlimited.
    #[arg(long, env = "MAX_RETRIES_B")]
    pub max_retries_b: Option<u32>,

    /// Lower bound of the inter-record jitter sleep, in milliseconds (§6.7).
    #[arg(long, env = "JITTER_MIN_MS", default_value_t = 200)]
    pub jitter_min_ms: u64,

    /// Upper bound of the inter-record jitter sleep, in milliseconds (§6.7).
    #[arg(long, env = "JITTER_MAX_MS", default_value_t = 800)]
    pub jitter_max_ms: u64,

    /// Extra sleep applied after settling a record that has already been
    /// retried at least once, in milliseconds (`retry-extra-sleep`, §6.7).
    #[arg(long, env = "RETRY_EXTRA_SLEEP_MS", default_value_t = 0)]
    pub retry_extra_sleep_ms: u64,

    /// How often an idle worker polls for a claimable record, in
    /// milliseconds (§6.7).
    #[arg(long, env = "WORKER_POLL_INTERVAL_MS", default_value_t = 2000)]
    pub worker_poll_interval_ms: u64,

    /// Bounded busy-wait applied to a contended claim, in seconds (§5, §6.6).
    #[arg(long, env = "CLAIM_TIMEOUT_SECS", default_value_t = 5)]
    pub claim_timeout_secs: u64,

    /// Bounded join timeout applied when stopping an orchestrator, in
    /// seconds (§4.5).
    #[arg(long, env = "STOP_JOIN_TIMEOUT_SECS", default_value_t = 15)]
    pub stop_join_timeout_secs: u64,

    /// Maximum time to wait for an in-flight HTTP request to complete, in
    /// seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Path to the redb database file.
    #[arg(long, env = "DATA_DIR", default_value = "./data/pipeline.redb")]
    pub data_dir: PathBuf,
}

impl PipelineConfig {
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_global_workers: self.max_global_workers,
            session_idle_timeout: Duration::from_secs(self.session_idle_timeout_secs),
            claim_timeout: Duration::from_secs(self.claim_timeout_secs),
            stop_join_timeout: Duration::from_secs(self.stop_join_timeout_secs),
            stage_a: self.apply_timing(STAGE_A),
            stage_b: self.apply_timing(STAGE_B),
            max_retries_a: self.max_retries_a,
            max_retries_b: self.max_retries_b,
        }
    }

    fn apply_timing(&self, mut spec: StageSpec) -> StageSpec {
        spec.poll_interval = Duration::from_millis(self.worker_poll_interval_ms);
        spec.jitter_min = Duration::from_millis(self.jitter_min_ms);
        spec.jitter_max = Duration::from_millis(self.jitter_max_ms);
        spec.retry_extra_sleep = Duration::from_millis(self.retry_extra_sleep_ms);
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_match_spec_recommended_values() {
        let config = PipelineConfig::parse_from(["pipeline-server"]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(config.headless);
        assert_eq!(config.max_global_workers, 10);
        assert_eq!(config.session_idle_timeout_secs, 1800);
        assert_eq!(config.max_retries_a, None);
        assert_eq!(config.max_retries_b, None);
    }

    #[test]
    fn session_config_carries_timing_overrides_into_both_stage_specs() {
        let config = PipelineConfig::parse_from([
            "pipeline-server",
            "--jitter-min-ms",
            "10",
            "--jitter-max-ms",
            "20",
            "--retry-extra-sleep-ms",
            "500",
            "--max-retries-a",
            "3",
        ]);
        let session = config.session_config();
        assert_eq!(session.stage_a.jitter_min, Duration::from_millis(10));
        assert_eq!(session.stage_b.jitter_max, Duration::from_millis(20));
        assert_eq!(session.stage_a.retry_extra_sleep, Duration::from_millis(500));
        assert_eq!(session.max_retries_a, Some(3));
        assert_eq!(session.max_retries_b, None);
    }

    #[test]
    fn http_config_reflects_host_and_port() {
        let config = PipelineConfig::parse_from(["pipeline-server", "--host", "127.0.0.1", "--port", "9090"]);
        let http = config.http_config();
        assert_eq!(http.host, "127.0.0.1");
        assert_eq!(http.port, 9090);
    }
}
