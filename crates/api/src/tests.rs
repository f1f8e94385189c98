//! End-to-end router tests driven through [`tower::ServiceExt::oneshot`],
//! grounded on `crates/api/src/tests/web/machine_health.rs`'s request/body
//! pattern (minus its Postgres fixture, since `InMemoryStore` needs none).

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use netreg_engine::mac_allocator::Oui;
use netreg_model::Network;
use netreg_network::AddressFamily;
use netreg_store::memory::InMemoryStore;
use netreg_uuid::NetworkUuid;
use serde_json::Value;
use tower::ServiceExt;

use crate::{router, AppState, HealthController};

fn test_app() -> Router {
    let state = Arc::new(AppState {
        store: Arc::new(InMemoryStore::new()),
        oui: Oui(0x90b8d0),
        health: HealthController::new(),
    });
    router(state)
}

fn sample_network() -> Network {
    Network {
        uuid: NetworkUuid::new_v4(),
        name: "t".into(),
        nic_tag: "t".into(),
        vlan_id: 46,
        vnet_id: None,
        family: AddressFamily::V4,
        subnet: ipnet::IpNet::from_str("10.0.2.0/24").unwrap(),
        provision_start: IpAddr::from_str("10.0.2.5").unwrap(),
        provision_end: IpAddr::from_str("10.0.2.250").unwrap(),
        gateway: None,
        resolvers: vec![],
        routes: BTreeMap::new(),
        mtu: 1500,
        owner_uuids: None,
        fabric: false,
        vpc_uuid: None,
        etag: netreg_model::Etag::generate(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ping_reports_healthy_with_an_empty_store() {
    let app = test_app();
    let response = app.oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["healthy"], Value::Bool(true));
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn network_lifecycle_create_get_404_after_delete() {
    let app = test_app();
    let network = sample_network();

    let create_res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/networks")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&network).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create_res.status(), StatusCode::OK);

    let get_res = app
        .clone()
        .oneshot(Request::builder().uri(format!("/networks/{}", network.uuid)).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(get_res.status(), StatusCode::OK);
    let etag = get_res.headers().get("etag").unwrap().to_str().unwrap().to_string();
    let fetched = body_json(get_res).await;
    assert_eq!(fetched["uuid"], network.uuid.to_string());

    let delete_res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/networks/{}", network.uuid))
                .header("if-match", etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete_res.status(), StatusCode::NO_CONTENT);

    let missing_res = app
        .clone()
        .oneshot(Request::builder().uri(format!("/networks/{}", network.uuid)).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing_res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn network_delete_with_stale_if_match_is_412() {
    let app = test_app();
    let network = sample_network();
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/networks")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&network).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let delete_res = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/networks/{}", network.uuid))
                .header("if-match", "not-the-right-etag")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete_res.status(), StatusCode::PRECONDITION_FAILED);
}

/// Scenario 4 (spec.md §8): creating a NIC with a MAC that's already in
/// use on another NIC fails with `422 DuplicateParameter{mac}`.
#[tokio::test]
async fn duplicate_mac_on_nic_create_is_422() {
    let app = test_app();
    let owner = netreg_uuid::OwnerUuid::new_v4();
    let belongs_to = netreg_uuid::BelongsToUuid::new_v4();
    let body = serde_json::json!({
        "mac": "90:b8:d0:17:37:17",
        "owner_uuid": owner.to_string(),
        "belongs_to_type": "zone",
        "belongs_to_uuid": belongs_to.to_string(),
    });

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/nics")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/nics")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err = body_json(second).await;
    assert_eq!(err["errors"][0]["field"], "mac");
}
