//! Request builder facade for the transit REST APIs.
//!
//! # Design
//! Each logical API call comes in two halves. `build_*` is pure: it produces
//! the `HttpRequest` and touches nothing else. The call method without the
//! prefix wraps that request in an `Operation` carrying the right
//! `DecodeConfig`, submits it to the queue, and returns the handle right
//! away. Callers either `wait()` on the handle or register `on_complete`;
//! neither blocks the calling thread.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::ClientConfig;
use crate::endpoint::{encode_component, EndpointBuilder};
use crate::envelope::{DecodeConfig, PayloadShape};
use crate::error::ClientError;
use crate::http::{HttpRequest, UreqTransport};
use crate::model::{CurrentTime, Model, Route, Stop, VehicleStatus, WeatherForecast};
use crate::operation::Operation;
use crate::queue::OperationQueue;

const SINGLE: DecodeConfig = DecodeConfig::primary(PayloadShape::Single);
const LIST: DecodeConfig = DecodeConfig::primary(PayloadShape::List);
const SECONDARY_SINGLE: DecodeConfig = DecodeConfig::secondary(PayloadShape::Single);

/// Builds, submits, and hands back operations for each API call.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    primary: EndpointBuilder,
    secondary: Option<EndpointBuilder>,
    queue: OperationQueue,
}

impl RequestBuilder {
    pub fn new(config: &ClientConfig, queue: OperationQueue) -> Result<Self, ClientError> {
        let identity = config.identity();
        let primary = EndpointBuilder::new(&config.base_url, &identity)?;
        let secondary = config
            .secondary_base_url
            .as_deref()
            .map(|url| EndpointBuilder::new(url, &identity))
            .transpose()?;
        Ok(Self {
            primary,
            secondary,
            queue,
        })
    }

    /// Wire up a ureq transport and a queue on the current Tokio runtime.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = Arc::new(UreqTransport::new(Duration::from_secs(config.timeout_secs)));
        let queue = OperationQueue::new(config.max_concurrent, transport)?;
        Self::new(config, queue)
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    // -----------------------------------------------------------------------
    // Vehicle status
    // -----------------------------------------------------------------------

    pub fn build_vehicle_status(&self, vehicle_id: &str) -> Result<HttpRequest, ClientError> {
        let path = format!("api/where/vehicle/{}.json", encode_component(vehicle_id));
        self.get(&self.primary, &path, &[])
    }

    pub fn vehicle_status(&self, vehicle_id: &str) -> Result<Operation<VehicleStatus>, ClientError> {
        self.submit(self.build_vehicle_status(vehicle_id)?, SINGLE)
    }

    // -----------------------------------------------------------------------
    // Current time
    // -----------------------------------------------------------------------

    pub fn build_current_time(&self) -> Result<HttpRequest, ClientError> {
        self.get(&self.primary, "api/where/current-time.json", &[])
    }

    pub fn current_time(&self) -> Result<Operation<CurrentTime>, ClientError> {
        self.submit(self.build_current_time()?, SINGLE)
    }

    // -----------------------------------------------------------------------
    // Stops and routes
    // -----------------------------------------------------------------------

    pub fn build_stop(&self, stop_id: &str) -> Result<HttpRequest, ClientError> {
        let path = format!("api/where/stop/{}.json", encode_component(stop_id));
        self.get(&self.primary, &path, &[])
    }

    pub fn stop(&self, stop_id: &str) -> Result<Operation<Stop>, ClientError> {
        self.submit(self.build_stop(stop_id)?, SINGLE)
    }

    pub fn build_route(&self, route_id: &str) -> Result<HttpRequest, ClientError> {
        let path = format!("api/where/route/{}.json", encode_component(route_id));
        self.get(&self.primary, &path, &[])
    }

    pub fn route(&self, route_id: &str) -> Result<Operation<Route>, ClientError> {
        self.submit(self.build_route(route_id)?, SINGLE)
    }

    pub fn build_stops_near(&self, lat: f64, lon: f64, radius_meters: u32) -> Result<HttpRequest, ClientError> {
        let params = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("radius", radius_meters.to_string()),
        ];
        self.get(&self.primary, "api/where/stops-for-location.json", &params)
    }

    pub fn stops_near(&self, lat: f64, lon: f64, radius_meters: u32) -> Result<Operation<Stop>, ClientError> {
        self.submit(self.build_stops_near(lat, lon, radius_meters)?, LIST)
    }

    pub fn build_routes_for_agency(&self, agency_id: &str) -> Result<HttpRequest, ClientError> {
        let path = format!("api/where/routes-for-agency/{}.json", encode_component(agency_id));
        self.get(&self.primary, &path, &[])
    }

    pub fn routes_for_agency(&self, agency_id: &str) -> Result<Operation<Route>, ClientError> {
        self.submit(self.build_routes_for_agency(agency_id)?, LIST)
    }

    // -----------------------------------------------------------------------
    // Secondary API
    // -----------------------------------------------------------------------

    pub fn build_weather(&self, region_id: u32) -> Result<HttpRequest, ClientError> {
        let secondary = self
            .secondary
            .as_ref()
            .ok_or(ClientError::MissingSecondaryBaseUrl)?;
        let path = format!("api/v1/regions/{region_id}/weather.json");
        self.get(secondary, &path, &[])
    }

    pub fn weather(&self, region_id: u32) -> Result<Operation<WeatherForecast>, ClientError> {
        self.submit(self.build_weather(region_id)?, SECONDARY_SINGLE)
    }

    fn get(
        &self,
        endpoints: &EndpointBuilder,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<HttpRequest, ClientError> {
        endpoints.build(path, params).map(HttpRequest::get)
    }

    fn submit<T: Model>(&self, request: HttpRequest, config: DecodeConfig) -> Result<Operation<T>, ClientError> {
        let operation = Operation::new(request, config);
        debug!(id = %operation.id(), url = %operation.request().url, "building operation");
        self.queue.submit(&operation)?;
        Ok(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    const IDENTITY_QUERY: &str =
        "key=org.onebusaway.iphone&app_uid=BD88D98C-A72D-47BE-8F4A-C60467239736&app_ver=20181001.23&version=2";

    fn config() -> ClientConfig {
        ClientConfig::new("http://localhost:3000").with_secondary_base_url("http://localhost:4000/")
    }

    fn queue() -> OperationQueue {
        OperationQueue::new(1, Arc::new(UreqTransport::new(Duration::from_secs(1)))).unwrap()
    }

    fn builder() -> RequestBuilder {
        RequestBuilder::new(&config(), queue()).unwrap()
    }

    #[tokio::test]
    async fn build_vehicle_status_produces_correct_request() {
        let req = builder().build_vehicle_status("1_4361").unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.url,
            format!("http://localhost:3000/api/where/vehicle/1_4361.json?{IDENTITY_QUERY}")
        );
    }

    #[tokio::test]
    async fn build_current_time_produces_correct_request() {
        let req = builder().build_current_time().unwrap();
        assert_eq!(
            req.url,
            format!("http://localhost:3000/api/where/current-time.json?{IDENTITY_QUERY}")
        );
    }

    #[tokio::test]
    async fn path_ids_are_encoded() {
        let req = builder().build_stop("1/75403").unwrap();
        assert!(req.url.starts_with("http://localhost:3000/api/where/stop/1%2F75403.json?"));
    }

    #[tokio::test]
    async fn build_stops_near_appends_location_params() {
        let req = builder().build_stops_near(47.6097, -122.3331, 250).unwrap();
        assert_eq!(
            req.url,
            format!(
                "http://localhost:3000/api/where/stops-for-location.json?{IDENTITY_QUERY}\
                 &lat=47.6097&lon=-122.3331&radius=250"
            )
        );
    }

    #[tokio::test]
    async fn build_weather_uses_secondary_base() {
        let req = builder().build_weather(1).unwrap();
        assert_eq!(
            req.url,
            format!("http://localhost:4000/api/v1/regions/1/weather.json?{IDENTITY_QUERY}")
        );
    }

    #[tokio::test]
    async fn weather_without_secondary_base_fails() {
        let mut builder = builder();
        builder.secondary = None;
        let err = builder.build_weather(1).unwrap_err();
        assert!(matches!(err, ClientError::MissingSecondaryBaseUrl));
    }

    #[tokio::test]
    async fn invalid_base_url_is_rejected_up_front() {
        let err = RequestBuilder::new(&ClientConfig::new("localhost:3000"), queue()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
    }
}
