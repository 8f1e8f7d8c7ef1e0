use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{optional_date, wire, Coordinate, Model, RawDate, Trip};
use crate::error::RecordError;
use crate::resolve::ReferenceResolver;

/// Real-time status of one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleStatus {
    pub vehicle_id: String,
    pub last_update_time: Option<DateTime<Utc>>,
    pub last_location_update_time: Option<DateTime<Utc>>,
    pub location: Option<Coordinate>,
    pub trip_id: Option<String>,
    /// The active trip, hydrated from the reference table.
    pub trip: Option<Trip>,
    pub status: Option<String>,
    pub phase: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVehicle {
    vehicle_id: String,
    #[serde(default)]
    last_update_time: Option<RawDate>,
    #[serde(default)]
    last_location_update_time: Option<RawDate>,
    #[serde(default)]
    location: Option<Coordinate>,
    #[serde(default)]
    trip_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    phase: Option<String>,
}

impl Model for VehicleStatus {
    fn decode(record: &Value, resolver: &ReferenceResolver<'_>) -> Result<Self, RecordError> {
        let wire: WireVehicle = wire(record)?;
        let dates = resolver.dates();
        let trip_id = wire.trip_id.filter(|id| !id.is_empty());
        Ok(Self {
            trip: trip_id.as_deref().and_then(|id| resolver.resolve(id)),
            vehicle_id: wire.vehicle_id,
            last_update_time: optional_date(wire.last_update_time.as_ref(), "lastUpdateTime", dates)?,
            last_location_update_time: optional_date(
                wire.last_location_update_time.as_ref(),
                "lastLocationUpdateTime",
                dates,
            )?,
            location: wire.location,
            trip_id,
            status: wire.status,
            phase: wire.phase,
        })
    }
}
