//! Asynchronous networking and model-decoding core for the transit REST APIs.
//!
//! # Overview
//! Turns REST API responses into typed, cross-referenced domain models:
//! builds GET requests, runs them under a concurrency ceiling, parses the
//! payload + references envelope, hydrates by-reference fields, and
//! delivers each operation's result or failure exactly once.
//!
//! # Design
//! - `RequestBuilder` is the facade. Its `build_*` methods are pure, and the
//!   matching call methods submit an `Operation` and return its handle.
//! - `OperationQueue` owns admission and is the only shared mutable state.
//! - Decoding is driven by an explicit `DecodeConfig` per call, never by
//!   global settings, because two API dialects coexist.
//! - Network I/O sits behind the `Transport` trait; tests script it, and
//!   production uses `UreqTransport`.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod http;
pub mod model;
pub mod operation;
pub mod queue;
pub mod resolve;

pub use client::RequestBuilder;
pub use crate::config::{AppIdentity, ClientConfig};
pub use endpoint::EndpointBuilder;
pub use envelope::{
    decode_envelope, DateStrategy, DecodeConfig, EntityKind, Envelope, EnvelopeLayout, PayloadNode,
    PayloadShape, ReferencePolicy, ReferenceTable,
};
pub use error::{ClientError, DecodeError, OperationError, RecordError, ResultError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportFuture, UreqTransport};
pub use model::{
    decode_models, Agency, Coordinate, CurrentTime, DecodeReport, Decoded, Entity, Model, Referenced, Route,
    Row, Stop, Trip, VehicleStatus, WeatherConditions, WeatherForecast,
};
pub use operation::{
    parse_response, Completion, CurrentTimeOperation, Operation, OperationId, OperationState, Outcome,
    RouteOperation, StopOperation, VehicleStatusOperation, WeatherOperation,
};
pub use queue::OperationQueue;
pub use resolve::{ReferenceResolver, ResolveStats};
