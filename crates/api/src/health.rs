//! `/ping` readiness (spec.md §6): `{status, healthy, services:{store}, config}`.
//!
//! Grounded on `crates/metrics-endpoint`'s `HealthController` (atomic
//! ready/healthy flags flipped by the owning process), adapted to also
//! probe the store directly rather than relying solely on a flag someone
//! else set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_store::Store;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Clone, Default)]
pub struct HealthController {
    healthy: Arc<AtomicBool>,
}

impl HealthController {
    pub fn new() -> Self {
        Self { healthy: Arc::new(AtomicBool::new(true)) }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Serialize)]
struct Services {
    store: &'static str,
}

#[derive(Debug, Serialize)]
struct PingBody {
    status: &'static str,
    healthy: bool,
    services: Services,
    config: serde_json::Value,
}

pub async fn ping(State(state): State<Arc<AppState>>) -> Response {
    let store_online = state
        .store
        .find(
            "networks",
            netreg_store::Filter::new(),
            netreg_store::FindOptions { limit: Some(1), ..Default::default() },
        )
        .await
        .is_ok();
    let healthy = state.health.is_healthy() && store_online;

    let body = PingBody {
        status: if healthy { "ok" } else { "degraded" },
        healthy,
        services: Services { store: if store_online { "online" } else { "offline" } },
        config: serde_json::json!({ "oui": format!("{:06x}", state.oui.0) }),
    };
    Json(body).into_response()
}
