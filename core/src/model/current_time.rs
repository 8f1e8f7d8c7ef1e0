use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{wire, Model, RawDate};
use crate::error::RecordError;
use crate::http::HttpResponse;
use crate::resolve::ReferenceResolver;

/// The server's clock, used to correct for local clock skew.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentTime {
    pub time: DateTime<Utc>,
    pub readable_time: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCurrentTime {
    time: RawDate,
    #[serde(default)]
    readable_time: Option<String>,
}

impl Model for CurrentTime {
    fn decode(record: &Value, resolver: &ReferenceResolver<'_>) -> Result<Self, RecordError> {
        let wire: WireCurrentTime = wire(record)?;
        Ok(Self {
            time: wire.time.to_datetime("time", resolver.dates())?,
            readable_time: wire.readable_time,
        })
    }

    /// The HTTP `Date` header is the server clock too.
    fn from_headers(response: &HttpResponse) -> Option<Self> {
        let header = response.header("date")?;
        match DateTime::parse_from_rfc2822(header) {
            Ok(time) => Some(Self {
                time: time.with_timezone(&Utc),
                readable_time: Some(header.to_string()),
            }),
            Err(error) => {
                debug!(%header, %error, "unparsable Date header");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_date(date: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("Date".to_string(), date.to_string())],
            body: String::new(),
        }
    }

    #[test]
    fn date_header_gives_server_time() {
        let now = CurrentTime::from_headers(&with_date("Tue, 02 Oct 2018 19:42:00 GMT")).unwrap();
        assert_eq!(now.time.to_rfc3339(), "2018-10-02T19:42:00+00:00");
        assert_eq!(now.readable_time.as_deref(), Some("Tue, 02 Oct 2018 19:42:00 GMT"));
    }

    #[test]
    fn missing_or_bad_date_header_gives_nothing() {
        assert_eq!(CurrentTime::from_headers(&HttpResponse::ok("")), None);
        assert_eq!(CurrentTime::from_headers(&with_date("yesterday")), None);
    }
}
