//! Liveness and readiness state of the detector
//!
//! Three fixed components report here. Overall health is the worst
//! component status; readiness additionally requires the pipeline to have
//! been marked as serving and not yet shut down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parts of the engine that report health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Routing, storage and scoring of inbound samples
    Ingestion,
    /// Model fitting
    Models,
    /// History and live subscriber fan-out
    Distribution,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::Ingestion,
        Component::Models,
        Component::Distribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Ingestion => "ingestion",
            Component::Models => "models",
            Component::Distribution => "distribution",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from best to worst, so the overall status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, with a fault worth a look
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered its current status
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct HealthState {
    components: BTreeMap<Component, ComponentHealth>,
    ready: bool,
}

/// Shared health registry; clones observe the same state
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy; the registry starts not ready
    pub fn new() -> Self {
        let components = Component::ALL
            .into_iter()
            .map(|c| (c, ComponentHealth::new(ComponentStatus::Healthy, None)))
            .collect();
        Self {
            state: Arc::new(RwLock::new(HealthState {
                components,
                ready: false,
            })),
        }
    }

    /// Record a status change; repeating the current status keeps `since`
    pub async fn set(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        let mut state = self.state.write().await;
        match state.components.get_mut(&component) {
            Some(current) if current.status == status => current.message = message,
            _ => {
                state
                    .components
                    .insert(component, ComponentHealth::new(status, message));
            }
        }
    }

    pub async fn set_healthy(&self, component: Component) {
        self.set(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    pub async fn status_of(&self, component: Component) -> Option<ComponentStatus> {
        self.state
            .read()
            .await
            .components
            .get(&component)
            .map(|h| h.status)
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let failed = state
            .components
            .iter()
            .find(|(_, h)| h.status == ComponentStatus::Unhealthy);

        let reason = match (state.ready, failed) {
            (false, _) => Some("detector is not serving".to_string()),
            (true, Some((component, _))) => Some(format!("{} is unhealthy", component)),
            (true, None) => None,
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), 3);

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("detector is not serving"));
    }

    #[tokio::test]
    async fn test_worst_component_wins() {
        let registry = HealthRegistry::new();
        registry
            .set_degraded(Component::Models, "training for 1/CPU timed out")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_unhealthy(Component::Distribution, "distribution hub closed")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        registry.set_healthy(Component::Distribution).await;
        registry.set_healthy(Component::Models).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .set_unhealthy(Component::Distribution, "distribution hub closed")
            .await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("distribution is unhealthy"));
    }

    #[tokio::test]
    async fn test_repeated_status_keeps_since() {
        let registry = HealthRegistry::new();
        registry.set_degraded(Component::Models, "first").await;
        let first = registry.health().await.components[&Component::Models].since;

        registry.set_degraded(Component::Models, "second").await;
        let health = registry.health().await;
        let models = &health.components[&Component::Models];
        assert_eq!(models.since, first);
        assert_eq!(models.message.as_deref(), Some("second"));
    }

    #[test]
    fn test_components_serialize_as_lowercase_keys() {
        let response = HealthResponse {
            status: ComponentStatus::Degraded,
            components: BTreeMap::from([(
                Component::Models,
                ComponentHealth::new(ComponentStatus::Degraded, Some("slow".to_string())),
            )]),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["components"]["models"]["message"], "slow");
        assert!(json["components"]["models"]["since"].is_string());
    }
}
