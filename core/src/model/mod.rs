//! Typed domain models and per-record decoding.
//!
//! # Design
//! Each model pairs a private serde "wire" struct, which mirrors the JSON
//! field names, with a public resolved type. `Model::decode` deserializes
//! the wire struct, converts dates according to the call's `DateStrategy`,
//! and swaps id-only fields for hydrated entities via the resolver. The
//! resolved value owns all of its data and keeps no link to the envelope.
//!
//! `Entity` closes the set of models that can appear together in mixed
//! result lists, with one `row` dispatch instead of runtime type checks.

mod agency;
mod current_time;
mod route;
mod stop;
mod trip;
mod vehicle;
mod weather;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::envelope::{DateStrategy, DecodeConfig, EntityKind, Envelope, PayloadNode};
use crate::error::{DecodeError, RecordError};
use crate::http::HttpResponse;
use crate::resolve::ReferenceResolver;

pub use agency::Agency;
pub use current_time::CurrentTime;
pub use route::Route;
pub use stop::Stop;
pub use trip::Trip;
pub use vehicle::VehicleStatus;
pub use weather::{WeatherConditions, WeatherForecast};

/// A typed value decoded from one raw record.
pub trait Model: Clone + std::fmt::Debug + Send + Sync + 'static {
    fn decode(record: &Value, resolver: &ReferenceResolver<'_>) -> Result<Self, RecordError>;

    /// Fallback read from response headers when the body yields nothing usable.
    fn from_headers(_response: &HttpResponse) -> Option<Self> {
        None
    }
}

/// A model that can be embedded by id through the reference table.
pub trait Referenced: Model {
    const KIND: EntityKind;
}

/// Deserialize a wire struct out of a raw record.
pub(crate) fn wire<'de, W: Deserialize<'de>>(record: &'de Value) -> Result<W, RecordError> {
    W::deserialize(record).map_err(|e| RecordError::Shape(e.to_string()))
}

/// A date as it appears on the wire, before the strategy is applied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawDate {
    Millis(i64),
    Text(String),
}

impl RawDate {
    pub(crate) fn to_datetime(
        &self,
        field: &'static str,
        strategy: DateStrategy,
    ) -> Result<DateTime<Utc>, RecordError> {
        let invalid = |reason: String| RecordError::Date { field, reason };
        match (strategy, self) {
            (DateStrategy::MillisecondsSinceEpoch, Self::Millis(millis)) => {
                DateTime::from_timestamp_millis(*millis)
                    .ok_or_else(|| invalid(format!("{millis} is out of range")))
            }
            (DateStrategy::Iso8601, Self::Text(text)) => DateTime::parse_from_rfc3339(text)
                .map(|date| date.with_timezone(&Utc))
                .map_err(|e| invalid(e.to_string())),
            (DateStrategy::MillisecondsSinceEpoch, Self::Text(_)) => {
                Err(invalid("expected epoch milliseconds".to_string()))
            }
            (DateStrategy::Iso8601, Self::Millis(_)) => Err(invalid("expected an ISO-8601 string".to_string())),
        }
    }
}

/// Convert an optional wire date; zero millis means "never" in the primary API.
pub(crate) fn optional_date(
    raw: Option<&RawDate>,
    field: &'static str,
    strategy: DateStrategy,
) -> Result<Option<DateTime<Utc>>, RecordError> {
    match (strategy, raw) {
        (_, None) | (DateStrategy::MillisecondsSinceEpoch, Some(RawDate::Millis(0))) => Ok(None),
        (_, Some(raw)) => raw.to_datetime(field, strategy).map(Some),
    }
}

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// Non-fatal decode problems for one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// List records that failed to decode and were left out.
    pub dropped_records: usize,
    /// By-reference fields left empty because the reference was missing.
    pub missing_references: usize,
    /// Reference-table lookups performed.
    pub lookups: usize,
    /// Reference resolutions served from the per-pass cache.
    pub cache_hits: usize,
}

/// The models decoded from one envelope, plus what went wrong along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub models: Vec<T>,
    pub report: DecodeReport,
}

/// Decode every record of an envelope's payload into `T`.
///
/// In a list, a record that fails is logged, counted, and dropped; the rest
/// keep their order. A single-entry payload that fails is an envelope error.
pub fn decode_models<T: Model>(envelope: &Envelope, config: &DecodeConfig) -> Result<Decoded<T>, DecodeError> {
    let resolver = ReferenceResolver::new(envelope.references(), config);
    let mut report = DecodeReport::default();

    let models = match envelope.payload() {
        PayloadNode::Single(record) => vec![T::decode(record, &resolver)?],
        PayloadNode::List(records) => records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| match T::decode(record, &resolver) {
                Ok(model) => Some(model),
                Err(error) => {
                    warn!(index, %error, "dropping malformed record");
                    report.dropped_records += 1;
                    None
                }
            })
            .collect(),
    };

    let stats = resolver.stats();
    report.missing_references = stats.missing;
    report.lookups = stats.lookups;
    report.cache_hits = stats.cache_hits;
    Ok(Decoded { models, report })
}

/// A display row for one entity in a mixed result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub title: String,
    pub subtitle: Option<String>,
}

/// The closed set of models that can share a result list.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Agency(Agency),
    Route(Route),
    Stop(Stop),
    Trip(Trip),
    Vehicle(VehicleStatus),
}

impl Entity {
    pub fn row(&self) -> Row {
        match self {
            Self::Agency(agency) => Row {
                title: agency.name.clone(),
                subtitle: agency.url.clone(),
            },
            Self::Route(route) => Row {
                title: route.short_name.clone(),
                subtitle: route.agency.as_ref().map(|agency| agency.name.clone()),
            },
            Self::Stop(stop) => Row {
                title: stop.name.clone(),
                subtitle: stop.code.clone(),
            },
            Self::Trip(trip) => Row {
                title: trip.headsign.clone().unwrap_or_else(|| trip.id.clone()),
                subtitle: trip.route.as_ref().map(|route| route.short_name.clone()),
            },
            Self::Vehicle(vehicle) => Row {
                title: vehicle.vehicle_id.clone(),
                subtitle: None,
            },
        }
    }
}

impl From<Agency> for Entity {
    fn from(agency: Agency) -> Self {
        Self::Agency(agency)
    }
}

impl From<Route> for Entity {
    fn from(route: Route) -> Self {
        Self::Route(route)
    }
}

impl From<Stop> for Entity {
    fn from(stop: Stop) -> Self {
        Self::Stop(stop)
    }
}

impl From<Trip> for Entity {
    fn from(trip: Trip) -> Self {
        Self::Trip(trip)
    }
}

impl From<VehicleStatus> for Entity {
    fn from(vehicle: VehicleStatus) -> Self {
        Self::Vehicle(vehicle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{decode_envelope, PayloadShape};
    use pretty_assertions::assert_eq;

    const LIST: DecodeConfig = DecodeConfig::primary(PayloadShape::List);

    #[test]
    fn raw_date_follows_strategy() {
        let millis = RawDate::Millis(1_539_000_000_123);
        let date = millis.to_datetime("t", DateStrategy::MillisecondsSinceEpoch).unwrap();
        assert_eq!(date.timestamp_millis(), 1_539_000_000_123);

        let text = RawDate::Text("2018-10-08T12:00:00Z".to_string());
        let date = text.to_datetime("t", DateStrategy::Iso8601).unwrap();
        assert_eq!(date.timestamp(), 1_539_000_000);
    }

    #[test]
    fn raw_date_rejects_strategy_mismatch() {
        let err = RawDate::Millis(1).to_datetime("t", DateStrategy::Iso8601).unwrap_err();
        assert!(matches!(err, RecordError::Date { field: "t", .. }));
        let err = RawDate::Text("x".to_string())
            .to_datetime("t", DateStrategy::MillisecondsSinceEpoch)
            .unwrap_err();
        assert!(matches!(err, RecordError::Date { .. }));
    }

    #[test]
    fn zero_millis_is_never_only_for_epoch_dates() {
        let zero = RawDate::Millis(0);
        assert_eq!(optional_date(Some(&zero), "t", DateStrategy::MillisecondsSinceEpoch).unwrap(), None);
        assert_eq!(optional_date(None, "t", DateStrategy::Iso8601).unwrap(), None);

        let err = optional_date(Some(&zero), "t", DateStrategy::Iso8601).unwrap_err();
        assert!(matches!(err, RecordError::Date { field: "t", .. }));
    }

    #[test]
    fn shared_reference_decodes_once_for_both_records() {
        let raw = r#"{"payload":{"list":[{"id":"1","shortName":"1","agencyId":"A1"},
                                          {"id":"2","shortName":"2","agencyId":"A1"}]},
                      "references":{"agency":{"A1":{"name":"Metro"}}}}"#;
        let envelope = decode_envelope(raw, &LIST).unwrap();
        let decoded = decode_models::<Route>(&envelope, &LIST).unwrap();

        assert_eq!(decoded.models.len(), 2);
        for route in &decoded.models {
            assert_eq!(route.agency.as_ref().unwrap().name, "Metro");
        }
        assert_eq!(decoded.models[0].agency, decoded.models[1].agency);
        assert_eq!(decoded.report.lookups, 1);
        assert_eq!(decoded.report.cache_hits, 1);
    }

    #[test]
    fn malformed_list_records_are_dropped_in_order() {
        let raw = r#"{"data":{"list":[{"id":"a","name":"First"},"junk",{"name":7},{"id":"b","name":"Second"}]}}"#;
        let envelope = decode_envelope(raw, &LIST).unwrap();
        let decoded = decode_models::<Agency>(&envelope, &LIST).unwrap();
        let ids: Vec<_> = decoded.models.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(decoded.report.dropped_records, 2);
    }

    #[test]
    fn malformed_single_entry_fails_envelope() {
        let config = DecodeConfig::primary(PayloadShape::Single);
        let envelope = decode_envelope(r#"{"data":{"entry":{"name":7}}}"#, &config).unwrap();
        let err = decode_models::<Agency>(&envelope, &config).unwrap_err();
        assert!(matches!(err, DecodeError::Entry(RecordError::Shape(_))));
    }

    #[test]
    fn missing_references_are_reported_not_fatal() {
        let raw = r#"{"data":{"list":[{"id":"1","shortName":"1","agencyId":"GONE"}]}}"#;
        let envelope = decode_envelope(raw, &LIST).unwrap();
        let decoded = decode_models::<Route>(&envelope, &LIST).unwrap();
        assert_eq!(decoded.models.len(), 1);
        assert!(decoded.models[0].agency.is_none());
        assert_eq!(decoded.report.missing_references, 1);
    }

    #[test]
    fn entity_rows_dispatch_per_kind() {
        let metro = Agency {
            id: "A1".to_string(),
            name: "Metro".to_string(),
            url: None,
            timezone: None,
            phone: None,
        };
        let route = Route {
            id: "R1".to_string(),
            short_name: "10".to_string(),
            long_name: None,
            description: None,
            route_type: None,
            color: None,
            agency_id: "A1".to_string(),
            agency: Some(metro.clone()),
        };

        assert_eq!(
            Entity::from(route.clone()).row(),
            Row {
                title: "10".to_string(),
                subtitle: Some("Metro".to_string())
            }
        );
        assert_eq!(Entity::from(metro).row().title, "Metro");

        let trip = Trip {
            id: "T1".to_string(),
            route_id: "R1".to_string(),
            headsign: None,
            service_id: None,
            shape_id: None,
            direction_id: None,
            route: Some(route),
        };
        assert_eq!(
            Entity::from(trip).row(),
            Row {
                title: "T1".to_string(),
                subtitle: Some("10".to_string())
            }
        );
    }
}
