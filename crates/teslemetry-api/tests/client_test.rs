#![allow(clippy::unwrap_used)]
// Integration tests for `TeslemetryClient` using wiremock.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use teslemetry_api::{Error, TeslemetryClient, TransportConfig, VEHICLE_DATA_ENDPOINTS};

const VIN: &str = "LRW3F7EK4NC000001";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, TeslemetryClient) {
    let server = MockServer::start().await;
    let client = TeslemetryClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

// ── Account ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bearer_header_is_sent() {
    let server = MockServer::start().await;
    let token: secrecy::SecretString = "tok-123".to_string().into();
    let client =
        TeslemetryClient::from_access_token(&server.uri(), &token, &TransportConfig::default())
            .unwrap();

    Mock::given(method("GET"))
        .and(path("/api/metadata"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uid": "u1",
            "region": "NA",
            "scopes": ["vehicle_device_data"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let meta = client.metadata().await.unwrap();
    assert_eq!(meta.region.as_deref(), Some("NA"));
    assert!(meta.has_scope("vehicle_device_data"));
}

#[tokio::test]
async fn test_products() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/1/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": [
                { "vin": VIN, "display_name": "Test" },
                { "energy_site_id": 123, "site_name": "Home" }
            ]
        })))
        .mount(&server)
        .await;

    let products = client.products().await.unwrap();
    assert_eq!(products["response"].as_array().unwrap().len(), 2);
}

// ── Vehicle ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_vehicle_data_joins_endpoints() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/1/vehicles/{VIN}/vehicle_data")))
        .and(query_param("endpoints", VEHICLE_DATA_ENDPOINTS.join(";")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "state": "online", "charge_state": { "battery_level": 80 } }
        })))
        .mount(&server)
        .await;

    let body = client
        .vehicle(VIN)
        .vehicle_data(VEHICLE_DATA_ENDPOINTS)
        .await
        .unwrap();
    assert_eq!(body["response"]["charge_state"]["battery_level"], 80);
}

#[tokio::test]
async fn test_vehicle_offline_maps_408() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/1/vehicles/{VIN}/vehicle_data")))
        .respond_with(ResponseTemplate::new(408).set_body_json(json!({
            "error": "vehicle unavailable: vehicle is offline or asleep"
        })))
        .mount(&server)
        .await;

    let result = client.vehicle(VIN).vehicle_data(&["charge_state"]).await;
    assert!(
        matches!(result, Err(Error::VehicleOffline)),
        "expected VehicleOffline, got: {result:?}"
    );
}

#[tokio::test]
async fn test_auth_statuses() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/1/energy_sites/1/live_status"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/1/energy_sites/1/site_info"))
        .respond_with(ResponseTemplate::new(402))
        .mount(&server)
        .await;

    let site = client.energy_site(1);
    assert!(matches!(site.live_status().await, Err(Error::InvalidToken)));
    assert!(matches!(site.site_info().await, Err(Error::SubscriptionRequired)));
}

#[tokio::test]
async fn test_fleet_error_carries_message() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(format!("/api/1/vehicles/{VIN}/command/charge_start")))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "internal_error",
            "error_description": "upstream timeout"
        })))
        .mount(&server)
        .await;

    let err = client
        .vehicle(VIN)
        .command("charge_start", &json!({}))
        .await
        .unwrap_err();
    match err {
        Error::Fleet { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "upstream timeout");
        }
        other => panic!("expected Fleet error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limited_reads_retry_after() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(format!("/api/1/vehicles/{VIN}/wake_up")))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
        .mount(&server)
        .await;

    let result = client.vehicle(VIN).wake_up().await;
    assert!(matches!(
        result,
        Err(Error::RateLimited {
            retry_after_secs: 17
        })
    ));
}

#[tokio::test]
async fn test_command_posts_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(format!("/api/1/vehicles/{VIN}/command/set_charge_limit")))
        .and(body_json(json!({ "percent": 80 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "result": true, "reason": "" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let body = client
        .vehicle(VIN)
        .command("set_charge_limit", &json!({ "percent": 80 }))
        .await
        .unwrap();
    assert_eq!(body["response"]["result"], true);
}

#[tokio::test]
async fn test_fleet_telemetry_config_missing() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/1/vehicles/{VIN}/fleet_telemetry_config")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "synced": false, "config": null }
        })))
        .mount(&server)
        .await;

    let result = client.vehicle(VIN).fleet_telemetry_config().await;
    assert!(
        matches!(result, Err(Error::VehicleNotConfigured { ref vin }) if vin == VIN),
        "expected VehicleNotConfigured, got: {result:?}"
    );
}

#[tokio::test]
async fn test_fleet_telemetry_config_present() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/1/vehicles/{VIN}/fleet_telemetry_config")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "synced": true,
                "config": { "fields": { "BatteryLevel": { "interval_seconds": 60 } } }
            }
        })))
        .mount(&server)
        .await;

    let config = client.vehicle(VIN).fleet_telemetry_config().await.unwrap();
    assert!(config.synced);
    assert!(config.config["fields"]["BatteryLevel"].is_object());
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/1/products"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client.products().await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected Deserialization error, got {other:?}"),
    }
}
