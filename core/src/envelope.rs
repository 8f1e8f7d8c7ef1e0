//! Response envelope parsing.
//!
//! # Design
//! Decoding is two-phase. `decode_envelope` only checks the outer structure
//! (valid JSON, payload present and of the expected shape) and splits the
//! body into a payload node and a reference table. Turning records into
//! models happens later, per record, so one corrupt record never takes its
//! siblings down with it.
//!
//! How a body is read is decided by an explicit `DecodeConfig` built at the
//! call site. The primary and secondary APIs coexist, so nothing here is
//! global.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::error::DecodeError;

/// Outer layout of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeLayout {
    /// `{ "code", "text", "data" | "payload", "references" }`
    Wrapped,
    /// The body is the record itself, or an array of records.
    Flat,
}

/// Whether the payload carries one record or a list of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Single,
    List,
}

/// How date fields are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStrategy {
    MillisecondsSinceEpoch,
    Iso8601,
}

/// Whether by-reference fields should be hydrated from the reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePolicy {
    Resolve,
    Ignore,
}

/// Per-call decoding configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeConfig {
    pub layout: EnvelopeLayout,
    pub shape: PayloadShape,
    pub dates: DateStrategy,
    pub references: ReferencePolicy,
}

impl DecodeConfig {
    /// Primary REST API: wrapped envelope, epoch-millisecond dates, references.
    pub const fn primary(shape: PayloadShape) -> Self {
        Self {
            layout: EnvelopeLayout::Wrapped,
            shape,
            dates: DateStrategy::MillisecondsSinceEpoch,
            references: ReferencePolicy::Resolve,
        }
    }

    /// Secondary API: flat snake_case JSON, ISO-8601 dates, no references.
    pub const fn secondary(shape: PayloadShape) -> Self {
        Self {
            layout: EnvelopeLayout::Flat,
            shape,
            dates: DateStrategy::Iso8601,
            references: ReferencePolicy::Ignore,
        }
    }
}

/// Kinds of entity that can appear in a reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Agency,
    Route,
    Stop,
    Trip,
}

impl EntityKind {
    /// Accepts both singular and OBA-style plural table names.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "agency" | "agencies" => Some(Self::Agency),
            "route" | "routes" => Some(Self::Route),
            "stop" | "stops" => Some(Self::Stop),
            "trip" | "trips" => Some(Self::Trip),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agency => "agency",
            Self::Route => "route",
            Self::Stop => "stop",
            Self::Trip => "trip",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw records keyed by `(kind, id)`. Later entries overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceTable {
    entries: HashMap<(EntityKind, String), Value>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, id: impl Into<String>, record: Value) {
        self.entries.insert((kind, id.into()), record);
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Option<&Value> {
        // Owned key for the lookup; ids are short.
        self.entries.get(&(kind, id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read one `references` object into the table.
    ///
    /// Each kind maps either to an `{id: record}` object or to an array of
    /// records carrying their own `id`.
    fn absorb(&mut self, references: &Map<String, Value>) {
        for (name, section) in references {
            let Some(kind) = EntityKind::from_wire(name) else {
                trace!(kind = %name, "skipping unknown reference kind");
                continue;
            };
            match section {
                Value::Object(records) => {
                    for (id, record) in records {
                        self.insert(kind, id.clone(), record.clone());
                    }
                }
                Value::Array(records) => {
                    for record in records {
                        match record.get("id").and_then(Value::as_str) {
                            Some(id) => self.insert(kind, id, record.clone()),
                            None => warn!(%kind, "reference entry without a string id skipped"),
                        }
                    }
                }
                _ => warn!(%kind, "reference section is neither an object nor an array"),
            }
        }
    }
}

/// The payload section of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadNode {
    Single(Value),
    List(Vec<Value>),
}

impl PayloadNode {
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::List(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A parsed response: payload plus reference table. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    payload: PayloadNode,
    references: ReferenceTable,
    code: Option<u16>,
    text: Option<String>,
}

impl Envelope {
    pub fn payload(&self) -> &PayloadNode {
        &self.payload
    }

    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    /// API-level status code, when the envelope carries one.
    pub fn code(&self) -> Option<u16> {
        self.code
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// Parse a raw response body into an `Envelope`.
pub fn decode_envelope(raw: &str, config: &DecodeConfig) -> Result<Envelope, DecodeError> {
    let body: Value = serde_json::from_str(raw).map_err(|e| DecodeError::Json(e.to_string()))?;
    match config.layout {
        EnvelopeLayout::Wrapped => decode_wrapped(body, config),
        EnvelopeLayout::Flat => Ok(Envelope {
            payload: payload_node(body, config.shape)?,
            references: ReferenceTable::new(),
            code: None,
            text: None,
        }),
    }
}

fn decode_wrapped(body: Value, config: &DecodeConfig) -> Result<Envelope, DecodeError> {
    let Value::Object(mut root) = body else {
        return Err(DecodeError::UnexpectedPayload { expected: "an envelope object" });
    };

    let code = root
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok());
    let text = root.get("text").and_then(Value::as_str).map(str::to_string);

    // An error envelope (`code` outside 2xx) carries no usable payload,
    // whatever its `data` holds.
    if let Some(code) = code.filter(|code| !(200..300).contains(code)) {
        return Ok(Envelope {
            payload: PayloadNode::List(Vec::new()),
            references: ReferenceTable::new(),
            code: Some(code),
            text,
        });
    }

    let mut data = root
        .remove("data")
        .or_else(|| root.remove("payload"))
        .filter(|data| !data.is_null())
        .ok_or(DecodeError::MissingPayload)?;

    let mut references = ReferenceTable::new();
    if config.references == ReferencePolicy::Resolve {
        // OBA nests the table inside `data`; a top-level table wins on conflict.
        let nested = data
            .as_object_mut()
            .and_then(|data| data.remove("references"));
        if let Some(Value::Object(nested)) = nested {
            references.absorb(&nested);
        }
        if let Some(Value::Object(top)) = root.get("references") {
            references.absorb(top);
        }
    } else if let Some(data) = data.as_object_mut() {
        data.remove("references");
    }

    let payload = match config.shape {
        PayloadShape::Single => {
            let entry = match data {
                Value::Object(mut data) if data.contains_key("entry") => {
                    data.remove("entry").unwrap_or(Value::Null)
                }
                other => other,
            };
            payload_node(entry, PayloadShape::Single)?
        }
        PayloadShape::List => match data {
            Value::Object(mut data) => {
                let list = data.remove("list").ok_or(DecodeError::MissingPayload)?;
                payload_node(list, PayloadShape::List)?
            }
            _ => return Err(DecodeError::UnexpectedPayload { expected: "an object with a list" }),
        },
    };

    Ok(Envelope {
        payload,
        references,
        code,
        text,
    })
}

fn payload_node(value: Value, shape: PayloadShape) -> Result<PayloadNode, DecodeError> {
    match (shape, value) {
        (PayloadShape::Single, value @ Value::Object(_)) => Ok(PayloadNode::Single(value)),
        (PayloadShape::Single, _) => Err(DecodeError::UnexpectedPayload { expected: "an object" }),
        (PayloadShape::List, Value::Array(records)) => Ok(PayloadNode::List(records)),
        (PayloadShape::List, _) => Err(DecodeError::UnexpectedPayload { expected: "an array" }),
    }
}
