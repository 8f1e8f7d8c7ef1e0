use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{wire, Coordinate, Model, Referenced, Route};
use crate::envelope::EntityKind;
use crate::error::RecordError;
use crate::resolve::ReferenceResolver;

/// A stop, with the routes serving it hydrated from the reference table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub direction: Option<String>,
    pub location: Coordinate,
    pub route_ids: Vec<String>,
    /// Routes from `route_ids` that were found in the reference table.
    pub routes: Vec<Route>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStop {
    id: String,
    name: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    lat: f64,
    lon: f64,
    #[serde(default)]
    route_ids: Vec<String>,
}

impl Model for Stop {
    fn decode(record: &Value, resolver: &ReferenceResolver<'_>) -> Result<Self, RecordError> {
        let wire: WireStop = wire(record)?;
        Ok(Self {
            routes: resolver.resolve_all(&wire.route_ids),
            id: wire.id,
            name: wire.name,
            code: wire.code,
            direction: wire.direction.filter(|d| !d.is_empty()),
            location: Coordinate {
                lat: wire.lat,
                lon: wire.lon,
            },
            route_ids: wire.route_ids,
        })
    }
}

impl Referenced for Stop {
    const KIND: EntityKind = EntityKind::Stop;
}
