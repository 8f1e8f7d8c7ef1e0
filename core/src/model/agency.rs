use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{wire, Model, Referenced};
use crate::envelope::EntityKind;
use crate::error::RecordError;
use crate::resolve::ReferenceResolver;

/// A transit agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agency {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub timezone: Option<String>,
    pub phone: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAgency {
    id: String,
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

impl Model for Agency {
    fn decode(record: &Value, _resolver: &ReferenceResolver<'_>) -> Result<Self, RecordError> {
        let wire: WireAgency = wire(record)?;
        Ok(Self {
            id: wire.id,
            name: wire.name,
            url: wire.url,
            timezone: wire.timezone,
            phone: wire.phone,
        })
    }
}

impl Referenced for Agency {
    const KIND: EntityKind = EntityKind::Agency;
}
