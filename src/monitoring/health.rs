//! Health tracking
//!
//! Provides the payload for:
//! - GET /monitoring/health - Full health status
//! - GET /monitoring/ready - Readiness probe

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComponentStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "degraded")]
    Degraded,
    #[serde(rename = "unhealthy")]
    Unhealthy,
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentStatus::Healthy => write!(f, "healthy"),
            ComponentStatus::Degraded => write!(f, "degraded"),
            ComponentStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Api,
    /// Retrieval index (rag mode) or assistant configuration.
    Knowledge,
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub api: ComponentStatus,
    pub knowledge: ComponentStatus,
    pub provider: ComponentStatus,
}

impl Default for ComponentHealth {
    fn default() -> Self {
        Self {
            api: ComponentStatus::Unhealthy,
            knowledge: ComponentStatus::Degraded,
            provider: ComponentStatus::Healthy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: ComponentStatus,
    pub timestamp: String,
    pub uptime_seconds: f64,
    pub components: ComponentHealth,
    pub message: Option<String>,
}

/// Tracks application health
pub struct HealthTracker {
    is_ready: AtomicBool,
    components: parking_lot::RwLock<ComponentHealth>,
    message: parking_lot::RwLock<Option<String>>,
    startup_time: std::time::Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            is_ready: AtomicBool::new(false),
            components: parking_lot::RwLock::new(ComponentHealth::default()),
            message: parking_lot::RwLock::new(None),
            startup_time: std::time::Instant::now(),
        }
    }

    pub fn mark_ready(&self) {
        self.is_ready.store(true, Ordering::SeqCst);
        tracing::info!("System marked as ready");
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    pub fn set_component_status(&self, component: Component, status: ComponentStatus) {
        let mut components = self.components.write();
        match component {
            Component::Api => components.api = status.clone(),
            Component::Knowledge => components.knowledge = status.clone(),
            Component::Provider => components.provider = status.clone(),
        }
        tracing::debug!(?component, status = %status, "Component status updated");
    }

    pub fn set_message(&self, message: Option<String>) {
        *self.message.write() = message;
    }

    /// Overall status is the worst component status.
    pub fn get_status(&self) -> HealthStatus {
        let components = self.components.read().clone();
        let all = [&components.api, &components.knowledge, &components.provider];
        let status = if all.iter().any(|s| **s == ComponentStatus::Unhealthy) {
            ComponentStatus::Unhealthy
        } else if all.iter().any(|s| **s == ComponentStatus::Degraded) {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        };

        HealthStatus {
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: self.startup_time.elapsed().as_secs_f64(),
            components,
            message: self.message.read().clone(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
