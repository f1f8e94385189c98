//! The HTTP/JSON façade (C9): spec.md §6 maps directly onto C3-C8, so this
//! crate is thin by design — one handler module per resource, a shared
//! [`AppState`], and the status-code mapping in [`error`].

pub mod crud;
pub mod error;
pub mod handlers;
pub mod health;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use netreg_engine::mac_allocator::Oui;
use netreg_store::Store;
use tower_http::trace::TraceLayer;

pub use health::HealthController;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub oui: Oui,
    pub health: HealthController,
}

/// Wires every resource spec.md §6 names onto its handlers. Colon-prefixed
/// path params (`:uuid`, `:mac`, ...) are axum 0.7's syntax.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/networks", get(handlers::networks::list).post(handlers::networks::create))
        .route(
            "/networks/:uuid",
            get(handlers::networks::get)
                .put(handlers::networks::update)
                .delete(handlers::networks::delete),
        )
        .route("/networks/:uuid/ips", get(handlers::ips::list))
        .route("/networks/:uuid/ips/:addr", get(handlers::ips::get).put(handlers::ips::update))
        .route("/networks/:uuid/nics", post(handlers::nics::provision))
        .route("/nics", get(handlers::nics::list).post(handlers::nics::create))
        .route(
            "/nics/:mac",
            get(handlers::nics::get).put(handlers::nics::update).delete(handlers::nics::delete),
        )
        .route("/nic_tags", get(handlers::nic_tags::list).post(handlers::nic_tags::create))
        .route(
            "/nic_tags/:name",
            get(handlers::nic_tags::get).put(handlers::nic_tags::update).delete(handlers::nic_tags::delete),
        )
        .route(
            "/network_pools",
            get(handlers::network_pools::list).post(handlers::network_pools::create),
        )
        .route("/network_pools/intersect", get(handlers::network_pools::intersect))
        .route(
            "/network_pools/:uuid",
            get(handlers::network_pools::get)
                .put(handlers::network_pools::update)
                .delete(handlers::network_pools::delete),
        )
        .route(
            "/aggregations",
            get(handlers::aggregations::list).post(handlers::aggregations::create),
        )
        .route(
            "/aggregations/:id",
            get(handlers::aggregations::get)
                .put(handlers::aggregations::update)
                .delete(handlers::aggregations::delete),
        )
        .route(
            "/fabrics/:owner/vlans",
            get(handlers::fabrics::list_vlans).post(handlers::fabrics::create_vlan),
        )
        .route(
            "/fabrics/:owner/vlans/:id",
            get(handlers::fabrics::get_vlan).put(handlers::fabrics::update_vlan).delete(handlers::fabrics::delete_vlan),
        )
        .route(
            "/fabrics/:owner/networks",
            get(handlers::fabrics::list_networks).post(handlers::fabrics::create_network),
        )
        .route(
            "/fabrics/:owner/networks/:uuid",
            get(handlers::fabrics::get_network)
                .put(handlers::fabrics::update_network)
                .delete(handlers::fabrics::delete_network),
        )
        .route("/vpc", get(handlers::vpc::list).post(handlers::vpc::create))
        .route(
            "/vpc/:uuid",
            get(handlers::vpc::get).put(handlers::vpc::update).delete(handlers::vpc::delete),
        )
        .route(
            "/vpc/:uuid/networks",
            get(handlers::vpc::list_networks).post(handlers::vpc::create_network),
        )
        .route(
            "/vpc/:uuid/networks/:uuid2",
            get(handlers::vpc::get_network).put(handlers::vpc::update_network).delete(handlers::vpc::delete_network),
        )
        .route("/search/ips", get(handlers::search::search_ips))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
