use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{wire, Agency, Model, Referenced};
use crate::envelope::EntityKind;
use crate::error::RecordError;
use crate::resolve::ReferenceResolver;

/// A route, with its operating agency hydrated from the reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub id: String,
    pub short_name: String,
    pub long_name: Option<String>,
    pub description: Option<String>,
    /// GTFS route type (0 tram, 3 bus, ...).
    pub route_type: Option<u32>,
    pub color: Option<String>,
    pub agency_id: String,
    pub agency: Option<Agency>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRoute {
    id: String,
    #[serde(default)]
    short_name: String,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "type")]
    route_type: Option<u32>,
    #[serde(default)]
    color: Option<String>,
    agency_id: String,
}

impl Model for Route {
    fn decode(record: &Value, resolver: &ReferenceResolver<'_>) -> Result<Self, RecordError> {
        let wire: WireRoute = wire(record)?;
        // OBA sends "" for absent optional strings.
        let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
        Ok(Self {
            agency: resolver.resolve(&wire.agency_id),
            id: wire.id,
            short_name: wire.short_name,
            long_name: non_empty(wire.long_name),
            description: non_empty(wire.description),
            route_type: wire.route_type,
            color: non_empty(wire.color),
            agency_id: wire.agency_id,
        })
    }
}

impl Referenced for Route {
    const KIND: EntityKind = EntityKind::Route;
}
