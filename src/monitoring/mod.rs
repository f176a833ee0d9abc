//! Monitoring for the nuri service
//!
//! Provides:
//! - Structured logging with tracing
//! - Prometheus metrics collection
//! - Health tracking for the monitoring endpoints

pub mod config;
pub mod health;
pub mod metrics;
pub mod tracing_config;

pub use config::{LogFormat, MonitoringConfig};
pub use health::{Component, ComponentStatus, HealthStatus, HealthTracker};
pub use metrics::{export_prometheus, record_turn, REGISTRY};

use std::sync::Arc;
use std::time::Instant;
use tracing_appender::non_blocking::WorkerGuard;

/// Monitoring context shared across the application
pub struct MonitoringContext {
    pub config: MonitoringConfig,
    pub health: Arc<HealthTracker>,
    pub startup_time: Instant,
    _log_guard: Option<WorkerGuard>,
}

impl MonitoringContext {
    /// Installs the tracing subscriber. Call before anything logs.
    pub fn new(config: MonitoringConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let log_guard = tracing_config::init_tracing(&config)?;
        let health = Arc::new(HealthTracker::new());

        let retrieval_buckets = metrics::parse_buckets_env("RETRIEVAL_HISTO_BUCKETS");
        tracing::info!(
            log_format = config.log_format.as_str(),
            file_logging = config.enable_file_logging,
            ?retrieval_buckets,
            "Monitoring system initialized"
        );

        Ok(Self {
            config,
            health,
            startup_time: Instant::now(),
            _log_guard: log_guard,
        })
    }

    /// Marks the API component healthy once the server is listening.
    pub fn startup_complete(&self) {
        self.health.set_component_status(Component::Api, ComponentStatus::Healthy);
        self.health.mark_ready();
        tracing::info!(
            duration_ms = self.startup_time.elapsed().as_millis() as u64,
            "Application startup complete"
        );
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health.get_status()
    }
}
