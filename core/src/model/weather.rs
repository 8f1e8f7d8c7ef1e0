use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{wire, Coordinate, Model, RawDate};
use crate::error::RecordError;
use crate::resolve::ReferenceResolver;

/// Regional weather from the secondary API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherForecast {
    pub region_identifier: i64,
    pub region_name: String,
    pub location: Coordinate,
    pub retrieved_at: DateTime<Utc>,
    pub units: String,
    pub today_summary: Option<String>,
    pub current: Option<WeatherConditions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConditions {
    pub summary: String,
    pub icon: String,
    pub temperature: f64,
    #[serde(default)]
    pub apparent_temperature: Option<f64>,
    #[serde(default)]
    pub precip_probability: Option<f64>,
}

// The secondary API speaks snake_case, which is serde's default here.
#[derive(Deserialize)]
struct WireWeather {
    region_identifier: i64,
    region_name: String,
    latitude: f64,
    longitude: f64,
    retrieved_at: RawDate,
    #[serde(default)]
    units: String,
    #[serde(default)]
    today_summary: Option<String>,
    #[serde(default)]
    current_forecast: Option<WeatherConditions>,
}

impl Model for WeatherForecast {
    fn decode(record: &Value, resolver: &ReferenceResolver<'_>) -> Result<Self, RecordError> {
        let wire: WireWeather = wire(record)?;
        Ok(Self {
            region_identifier: wire.region_identifier,
            region_name: wire.region_name,
            location: Coordinate {
                lat: wire.latitude,
                lon: wire.longitude,
            },
            retrieved_at: wire.retrieved_at.to_datetime("retrieved_at", resolver.dates())?,
            units: wire.units,
            today_summary: wire.today_summary,
            current: wire.current_forecast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{DecodeConfig, PayloadShape, ReferenceTable};
    use serde_json::json;

    #[test]
    fn decodes_snake_case_with_iso_dates() {
        let table = ReferenceTable::new();
        let config = DecodeConfig::secondary(PayloadShape::Single);
        let resolver = ReferenceResolver::new(&table, &config);
        let record = json!({
            "latitude": 47.6,
            "longitude": -122.3,
            "region_identifier": 1,
            "region_name": "Puget Sound",
            "retrieved_at": "2018-10-08T12:00:00-07:00",
            "units": "us",
            "today_summary": "Rain",
            "current_forecast": {"icon": "rain", "summary": "Drizzle", "temperature": 51.5}
        });
        let weather = WeatherForecast::decode(&record, &resolver).unwrap();
        assert_eq!(weather.retrieved_at.timestamp(), 1_539_025_200);
        assert_eq!(weather.current.unwrap().temperature, 51.5);
    }

    #[test]
    fn millis_under_iso_strategy_fails() {
        let table = ReferenceTable::new();
        let config = DecodeConfig::secondary(PayloadShape::Single);
        let resolver = ReferenceResolver::new(&table, &config);
        let record = json!({
            "latitude": 0.0, "longitude": 0.0, "region_identifier": 1,
            "region_name": "x", "retrieved_at": 1539000000000_i64
        });
        assert!(WeatherForecast::decode(&record, &resolver).is_err());
    }
}
