use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{wire, Model, Referenced, Route};
use crate::envelope::EntityKind;
use crate::error::RecordError;
use crate::resolve::ReferenceResolver;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trip {
    pub id: String,
    pub route_id: String,
    pub headsign: Option<String>,
    pub service_id: Option<String>,
    pub shape_id: Option<String>,
    pub direction_id: Option<String>,
    pub route: Option<Route>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTrip {
    id: String,
    route_id: String,
    #[serde(default, rename = "tripHeadsign")]
    headsign: Option<String>,
    #[serde(default)]
    service_id: Option<String>,
    #[serde(default)]
    shape_id: Option<String>,
    #[serde(default)]
    direction_id: Option<String>,
}

impl Model for Trip {
    fn decode(record: &Value, resolver: &ReferenceResolver<'_>) -> Result<Self, RecordError> {
        let wire: WireTrip = wire(record)?;
        Ok(Self {
            route: resolver.resolve(&wire.route_id),
            id: wire.id,
            route_id: wire.route_id,
            headsign: wire.headsign.filter(|h| !h.is_empty()),
            service_id: wire.service_id,
            shape_id: wire.shape_id,
            direction_id: wire.direction_id,
        })
    }
}

impl Referenced for Trip {
    const KIND: EntityKind = EntityKind::Trip;
}
