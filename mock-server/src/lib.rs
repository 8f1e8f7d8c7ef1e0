use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

/// Raw records served by the mock API, in primary-API (camelCase) form.
///
/// Records are kept as JSON so tests can plant malformed entries.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub agencies: Vec<Value>,
    pub routes: Vec<Value>,
    pub stops: Vec<Value>,
    pub trips: Vec<Value>,
    pub vehicles: Vec<Value>,
    /// Secondary-API weather documents (snake_case), keyed by `region_identifier`.
    pub weather: Vec<Value>,
}

impl Dataset {
    /// A small slice of the Puget Sound network.
    pub fn sample() -> Self {
        Self {
            agencies: vec![
                json!({"id": "1", "name": "Metro Transit", "url": "https://kingcounty.gov/metro",
                       "timezone": "America/Los_Angeles", "phone": "206-553-3000"}),
                json!({"id": "40", "name": "Sound Transit", "url": "https://www.soundtransit.org",
                       "timezone": "America/Los_Angeles"}),
            ],
            routes: vec![
                json!({"id": "1_100224", "shortName": "44", "longName": "Ballard - Montlake",
                       "description": "", "type": 3, "color": "", "agencyId": "1"}),
                json!({"id": "1_100275", "shortName": "49", "longName": "University District - Broadway",
                       "type": 3, "agencyId": "1"}),
                json!({"id": "40_100479", "shortName": "1 Line", "longName": "Northgate - Angle Lake",
                       "type": 0, "color": "28813F", "agencyId": "40"}),
            ],
            stops: vec![
                json!({"id": "1_75403", "name": "Stevens Way & Benton Ln NE", "code": "75403",
                       "direction": "SW", "lat": 47.654365, "lon": -122.305214,
                       "routeIds": ["1_100224", "1_100275"]}),
                json!({"id": "1_75414", "name": "Stevens Way & Pend Oreille Rd NE", "code": "75414",
                       "direction": "NE", "lat": 47.655071, "lon": -122.304001,
                       "routeIds": ["1_100224"]}),
                json!({"id": "40_990005", "name": "University of Washington", "code": "990005",
                       "lat": 47.649658, "lon": -122.303978, "routeIds": ["40_100479"]}),
            ],
            trips: vec![json!({"id": "1_604670535", "routeId": "1_100224",
                               "tripHeadsign": "Ballard", "serviceId": "1_WEEKDAY",
                               "shapeId": "1_10044003", "directionId": "0"})],
            vehicles: vec![json!({"vehicleId": "1_4361", "lastUpdateTime": 1539000000000_i64,
                                  "lastLocationUpdateTime": 1538999990000_i64,
                                  "location": {"lat": 47.6612, "lon": -122.3128},
                                  "tripId": "1_604670535", "status": "SCHEDULED",
                                  "phase": "in_progress"})],
            weather: vec![json!({"latitude": 47.6062, "longitude": -122.3321,
                                 "region_identifier": 1, "region_name": "Puget Sound",
                                 "retrieved_at": "2018-10-08T12:00:00Z", "units": "us",
                                 "today_summary": "Light rain in the afternoon.",
                                 "current_forecast": {"icon": "rain", "summary": "Drizzle",
                                                      "temperature": 51.5,
                                                      "apparent_temperature": 50.2,
                                                      "precip_probability": 0.4}})],
        }
    }
}

pub type Db = Arc<RwLock<Dataset>>;

/// The fixed identity parameters every request must carry.
#[derive(Debug, Deserialize)]
pub struct ApiParams {
    pub key: Option<String>,
    pub app_uid: Option<String>,
    pub app_ver: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LocationParams {
    pub key: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_radius")]
    pub radius: f64,
}

fn default_radius() -> f64 {
    500.0
}

pub fn app() -> Router {
    app_with(Dataset::sample())
}

pub fn app_with(dataset: Dataset) -> Router {
    let db: Db = Arc::new(RwLock::new(dataset));
    Router::new()
        .route("/api/where/current-time.json", get(current_time))
        .route("/api/where/vehicle/{file}", get(vehicle))
        .route("/api/where/stop/{file}", get(stop))
        .route("/api/where/route/{file}", get(route))
        .route("/api/where/routes-for-agency/{file}", get(routes_for_agency))
        .route("/api/where/stops-for-location.json", get(stops_for_location))
        .route("/api/v1/regions/{region_id}/weather.json", get(weather))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, Dataset::sample()).await
}

pub async fn run_with(listener: TcpListener, dataset: Dataset) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock transit API listening");
    }
    axum::serve(listener, app_with(dataset)).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn current_time(Query(params): Query<ApiParams>) -> Response {
    if let Err(denied) = authorize(params.key.as_deref()) {
        return denied;
    }
    let now = Utc::now();
    let entry = json!({
        "time": now.timestamp_millis(),
        "readableTime": now.to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    entry_envelope(entry, References::default())
}

async fn vehicle(
    State(db): State<Db>,
    Path(file): Path<String>,
    Query(params): Query<ApiParams>,
) -> Response {
    if let Err(denied) = authorize(params.key.as_deref()) {
        return denied;
    }
    let Some(id) = strip_json(&file) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let data = db.read().await;
    let Some(vehicle) = find(&data.vehicles, "vehicleId", id) else {
        return not_found_envelope();
    };
    let mut refs = References::default();
    if let Some(trip_id) = vehicle["tripId"].as_str() {
        refs.add_trip(&data, trip_id);
    }
    entry_envelope(vehicle.clone(), refs)
}

async fn stop(
    State(db): State<Db>,
    Path(file): Path<String>,
    Query(params): Query<ApiParams>,
) -> Response {
    if let Err(denied) = authorize(params.key.as_deref()) {
        return denied;
    }
    let Some(id) = strip_json(&file) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let data = db.read().await;
    let Some(stop) = find(&data.stops, "id", id) else {
        return not_found_envelope();
    };
    let mut refs = References::default();
    refs.add_stop_routes(&data, stop);
    entry_envelope(stop.clone(), refs)
}

async fn route(
    State(db): State<Db>,
    Path(file): Path<String>,
    Query(params): Query<ApiParams>,
) -> Response {
    if let Err(denied) = authorize(params.key.as_deref()) {
        return denied;
    }
    let Some(id) = strip_json(&file) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let data = db.read().await;
    let Some(route) = find(&data.routes, "id", id) else {
        return not_found_envelope();
    };
    let mut refs = References::default();
    if let Some(agency_id) = route["agencyId"].as_str() {
        refs.add_agency(&data, agency_id);
    }
    entry_envelope(route.clone(), refs)
}

async fn routes_for_agency(
    State(db): State<Db>,
    Path(file): Path<String>,
    Query(params): Query<ApiParams>,
) -> Response {
    if let Err(denied) = authorize(params.key.as_deref()) {
        return denied;
    }
    let Some(agency_id) = strip_json(&file) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let data = db.read().await;
    if find(&data.agencies, "id", agency_id).is_none() {
        return not_found_envelope();
    }
    let routes: Vec<Value> = data
        .routes
        .iter()
        .filter(|route| route["agencyId"] == agency_id)
        .cloned()
        .collect();
    let mut refs = References::default();
    refs.add_agency(&data, agency_id);
    list_envelope(routes, refs)
}

async fn stops_for_location(State(db): State<Db>, Query(params): Query<LocationParams>) -> Response {
    if let Err(denied) = authorize(params.key.as_deref()) {
        return denied;
    }
    let data = db.read().await;
    let mut refs = References::default();
    // Records without coordinates (e.g. planted malformed ones) are always served.
    let stops: Vec<Value> = data
        .stops
        .iter()
        .filter(|stop| match (stop["lat"].as_f64(), stop["lon"].as_f64()) {
            (Some(lat), Some(lon)) => distance_meters(params.lat, params.lon, lat, lon) <= params.radius,
            _ => true,
        })
        .cloned()
        .collect();
    for stop in &stops {
        refs.add_stop_routes(&data, stop);
    }
    debug!(lat = params.lat, lon = params.lon, found = stops.len(), "stops for location");
    list_envelope(stops, refs)
}

async fn weather(
    State(db): State<Db>,
    Path(region_id): Path<i64>,
    Query(params): Query<ApiParams>,
) -> Response {
    if let Err(denied) = authorize(params.key.as_deref()) {
        return denied;
    }
    let data = db.read().await;
    data.weather
        .iter()
        .find(|doc| doc["region_identifier"].as_i64() == Some(region_id))
        .map(|doc| Json(doc.clone()).into_response())
        .unwrap_or_else(|| StatusCode::NOT_FOUND.into_response())
}

// ---------------------------------------------------------------------------
// Envelope helpers
// ---------------------------------------------------------------------------

/// Reference sections collected while serving one response, OBA style.
#[derive(Debug, Default)]
struct References {
    agencies: Vec<Value>,
    routes: Vec<Value>,
    trips: Vec<Value>,
}

impl References {
    fn add_agency(&mut self, data: &Dataset, id: &str) {
        push_unique(&mut self.agencies, find(&data.agencies, "id", id));
    }

    fn add_route(&mut self, data: &Dataset, id: &str) {
        let route = find(&data.routes, "id", id);
        if let Some(agency_id) = route.and_then(|r| r["agencyId"].as_str()) {
            self.add_agency(data, agency_id);
        }
        push_unique(&mut self.routes, route);
    }

    fn add_trip(&mut self, data: &Dataset, id: &str) {
        let trip = find(&data.trips, "id", id);
        if let Some(route_id) = trip.and_then(|t| t["routeId"].as_str()) {
            self.add_route(data, route_id);
        }
        push_unique(&mut self.trips, trip);
    }

    fn add_stop_routes(&mut self, data: &Dataset, stop: &Value) {
        for route_id in stop["routeIds"].as_array().into_iter().flatten() {
            if let Some(route_id) = route_id.as_str() {
                self.add_route(data, route_id);
            }
        }
    }

    fn into_json(self) -> Value {
        json!({
            "agencies": self.agencies,
            "routes": self.routes,
            "stops": [],
            "trips": self.trips,
            "situations": [],
        })
    }
}

fn push_unique(section: &mut Vec<Value>, record: Option<&Value>) {
    if let Some(record) = record {
        if !section.iter().any(|existing| existing["id"] == record["id"]) {
            section.push(record.clone());
        }
    }
}

fn find<'a>(records: &'a [Value], key: &str, id: &str) -> Option<&'a Value> {
    records.iter().find(|record| record[key] == id)
}

fn strip_json(file: &str) -> Option<&str> {
    file.strip_suffix(".json").filter(|id| !id.is_empty())
}

fn envelope(code: u16, text: &str, data: Value) -> Value {
    json!({
        "code": code,
        "currentTime": Utc::now().timestamp_millis(),
        "text": text,
        "version": 2,
        "data": data,
    })
}

fn entry_envelope(entry: Value, refs: References) -> Response {
    let data = json!({"entry": entry, "references": refs.into_json()});
    Json(envelope(200, "OK", data)).into_response()
}

fn list_envelope(list: Vec<Value>, refs: References) -> Response {
    let data = json!({"list": list, "limitExceeded": false, "references": refs.into_json()});
    Json(envelope(200, "OK", data)).into_response()
}

/// OBA answers unknown ids with HTTP 200 and an in-band 404.
fn not_found_envelope() -> Response {
    Json(json!({
        "code": 404,
        "currentTime": Utc::now().timestamp_millis(),
        "text": "resource not found",
        "version": 2,
    }))
    .into_response()
}

fn authorize(key: Option<&str>) -> Result<(), Response> {
    match key {
        Some(key) if !key.is_empty() => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": 401, "text": "permission denied", "version": 2})),
        )
            .into_response()),
    }
}

/// Equirectangular approximation; plenty for a few kilometres.
fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let mean_lat = ((lat1 + lat2) / 2.0).to_radians();
    let x = (lon2 - lon1).to_radians() * mean_lat.cos();
    let y = (lat2 - lat1).to_radians();
    (x * x + y * y).sqrt() * EARTH_RADIUS_M
}
