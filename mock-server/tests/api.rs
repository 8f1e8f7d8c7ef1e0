use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with, Dataset};
use serde_json::{json, Value};
use tower::ServiceExt;

const IDENTITY: &str = "key=org.onebusaway.iphone&app_uid=test&app_ver=1&version=2";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- identity ---

#[tokio::test]
async fn missing_key_returns_401() {
    let resp = app()
        .oneshot(get("/api/where/current-time.json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["code"], 401);
}

// --- current time ---

#[tokio::test]
async fn current_time_returns_entry_with_millis() {
    let resp = app()
        .oneshot(get(&format!("/api/where/current-time.json?{IDENTITY}")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["code"], 200);
    assert!(body["data"]["entry"]["time"].as_i64().unwrap() > 1_500_000_000_000);
    assert!(body["data"]["entry"]["readableTime"].is_string());
}

// --- vehicle ---

#[tokio::test]
async fn vehicle_includes_trip_route_and_agency_references() {
    let resp = app()
        .oneshot(get(&format!("/api/where/vehicle/1_4361.json?{IDENTITY}")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["entry"]["vehicleId"], "1_4361");
    let refs = &body["data"]["references"];
    assert_eq!(refs["trips"][0]["id"], "1_604670535");
    assert_eq!(refs["routes"][0]["id"], "1_100224");
    assert_eq!(refs["agencies"][0]["id"], "1");
}

#[tokio::test]
async fn unknown_vehicle_is_in_band_404() {
    let resp = app()
        .oneshot(get(&format!("/api/where/vehicle/nope.json?{IDENTITY}")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["code"], 404);
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn path_without_json_suffix_is_404() {
    let resp = app()
        .oneshot(get(&format!("/api/where/vehicle/1_4361?{IDENTITY}")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- stops ---

#[tokio::test]
async fn stop_references_every_serving_route_once() {
    let resp = app()
        .oneshot(get(&format!("/api/where/stop/1_75403.json?{IDENTITY}")))
        .await
        .unwrap();

    let body = body_json(resp).await;
    let refs = &body["data"]["references"];
    assert_eq!(refs["routes"].as_array().unwrap().len(), 2);
    assert_eq!(refs["agencies"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn stops_for_location_filters_by_radius() {
    let uri = format!("/api/where/stops-for-location.json?{IDENTITY}&lat=47.654365&lon=-122.305214&radius=200");
    let resp = app().oneshot(get(&uri)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let ids: Vec<_> = body["data"]["list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|stop| stop["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["1_75403", "1_75414"]);
}

#[tokio::test]
async fn stops_for_location_requires_coordinates() {
    let uri = format!("/api/where/stops-for-location.json?{IDENTITY}");
    let resp = app().oneshot(get(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn planted_malformed_stop_is_served_as_is() {
    let mut dataset = Dataset::sample();
    dataset.stops.insert(1, json!({"id": 7}));
    let uri = format!("/api/where/stops-for-location.json?{IDENTITY}&lat=47.654365&lon=-122.305214&radius=200");
    let resp = app_with(dataset).oneshot(get(&uri)).await.unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["data"]["list"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"]["list"][1], json!({"id": 7}));
}

// --- routes ---

#[tokio::test]
async fn routes_for_agency_lists_only_that_agency() {
    let resp = app()
        .oneshot(get(&format!("/api/where/routes-for-agency/1.json?{IDENTITY}")))
        .await
        .unwrap();

    let body = body_json(resp).await;
    let list = body["data"]["list"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|route| route["agencyId"] == "1"));
}

#[tokio::test]
async fn routes_for_unknown_agency_is_in_band_404() {
    let resp = app()
        .oneshot(get(&format!("/api/where/routes-for-agency/99.json?{IDENTITY}")))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["code"], 404);
}

// --- secondary API ---

#[tokio::test]
async fn weather_is_flat_snake_case() {
    let resp = app()
        .oneshot(get(&format!("/api/v1/regions/1/weather.json?{IDENTITY}")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["region_name"], "Puget Sound");
    assert_eq!(body["retrieved_at"], "2018-10-08T12:00:00Z");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn weather_for_unknown_region_is_404() {
    let resp = app()
        .oneshot(get(&format!("/api/v1/regions/42/weather.json?{IDENTITY}")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
