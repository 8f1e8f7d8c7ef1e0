//! Operations: one fetch → decode → resolve unit of work.
//!
//! # Design
//! An `Operation<T>` is a cloneable handle around shared state. The state
//! machine and the result slot sit behind one mutex, so every terminal
//! transition is a single check-and-set: whichever of `finish` and `cancel`
//! takes the lock first decides the outcome, and the loser is a no-op. The
//! completion callback is taken out of the slot in that same critical
//! section, which is what makes it fire at most once, and never after
//! cancellation.
//!
//! State changes are also published on a `watch` channel. `wait()` awaits
//! it, and a running operation races its transport call against it to
//! notice cancellation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::envelope::{decode_envelope, DecodeConfig};
use crate::error::{OperationError, ResultError, TransportError};
use crate::http::{check_status, HttpRequest, HttpResponse, Transport};
use crate::model::{
    decode_models, CurrentTime, DecodeReport, Decoded, Model, Route, Stop, VehicleStatus, WeatherForecast,
};

/// Unique identifier of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(Uuid);

impl OperationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of an operation. `Completed`, `Failed` and `Cancelled` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Models on success, the classified cause on failure. Never both.
pub type Outcome<T> = Result<Vec<T>, OperationError>;

/// Called once when an operation completes or fails.
pub type Completion<T> = Box<dyn FnOnce(&Operation<T>) + Send + 'static>;

pub type VehicleStatusOperation = Operation<VehicleStatus>;
pub type CurrentTimeOperation = Operation<CurrentTime>;
pub type StopOperation = Operation<Stop>;
pub type RouteOperation = Operation<Route>;
pub type WeatherOperation = Operation<WeatherForecast>;

struct Slot<T: Model> {
    state: OperationState,
    outcome: Option<Outcome<T>>,
    report: DecodeReport,
    completion: Option<Completion<T>>,
}

struct Shared<T: Model> {
    id: OperationId,
    request: HttpRequest,
    config: DecodeConfig,
    submitted: AtomicBool,
    slot: Mutex<Slot<T>>,
    state: watch::Sender<OperationState>,
}

/// Handle to one fetch-decode-resolve unit of work.
pub struct Operation<T: Model> {
    shared: Arc<Shared<T>>,
}

impl<T: Model> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Model> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.shared.id)
            .field("url", &self.shared.request.url)
            .field("state", &self.state())
            .finish()
    }
}

impl<T: Model> Operation<T> {
    pub fn new(request: HttpRequest, config: DecodeConfig) -> Self {
        let (state, _) = watch::channel(OperationState::Pending);
        Self {
            shared: Arc::new(Shared {
                id: OperationId::new(),
                request,
                config,
                submitted: AtomicBool::new(false),
                slot: Mutex::new(Slot {
                    state: OperationState::Pending,
                    outcome: None,
                    report: DecodeReport::default(),
                    completion: None,
                }),
                state,
            }),
        }
    }

    pub fn id(&self) -> OperationId {
        self.shared.id
    }

    pub fn request(&self) -> &HttpRequest {
        &self.shared.request
    }

    pub fn decode_config(&self) -> &DecodeConfig {
        &self.shared.config
    }

    pub fn state(&self) -> OperationState {
        self.shared.slot.lock().state
    }

    /// True once a result or an error is available.
    pub fn is_complete(&self) -> bool {
        matches!(self.state(), OperationState::Completed | OperationState::Failed)
    }

    /// Non-fatal decode problems seen while completing.
    pub fn report(&self) -> DecodeReport {
        self.shared.slot.lock().report
    }

    /// Register the completion callback.
    ///
    /// Fires exactly once, on `Completed` or `Failed`. If the operation has
    /// already finished it fires right away; if it was cancelled it never
    /// fires. Registering again before it fires replaces the callback.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Operation<T>) + Send + 'static,
    {
        let mut slot = self.shared.slot.lock();
        let state = slot.state;
        match state {
            OperationState::Completed | OperationState::Failed => {
                drop(slot);
                callback(self);
            }
            OperationState::Cancelled => {}
            OperationState::Pending | OperationState::Running => {
                slot.completion = Some(Box::new(callback));
            }
        }
    }

    /// Withdraw interest. Returns false if the operation had already finished.
    ///
    /// A pending operation will never start; a running one stops waiting on
    /// its transport call and discards any reply.
    pub fn cancel(&self) -> bool {
        let mut slot = self.shared.slot.lock();
        if slot.state.is_terminal() {
            return false;
        }
        let previous = slot.state;
        slot.state = OperationState::Cancelled;
        slot.completion = None;
        drop(slot);

        self.shared.state.send_replace(OperationState::Cancelled);
        debug!(id = %self.shared.id, ?previous, "operation cancelled");
        true
    }

    /// The outcome, once the operation has completed or failed.
    pub fn result(&self) -> Result<Outcome<T>, ResultError> {
        let slot = self.shared.slot.lock();
        match slot.state {
            OperationState::Cancelled => Err(ResultError::Cancelled),
            OperationState::Completed | OperationState::Failed => {
                slot.outcome.clone().ok_or(ResultError::NotReady)
            }
            OperationState::Pending | OperationState::Running => Err(ResultError::NotReady),
        }
    }

    /// Wait for a terminal state, then return `result()`.
    pub async fn wait(&self) -> Result<Outcome<T>, ResultError> {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|state| state.is_terminal()).await;
        self.result()
    }

    pub(crate) fn mark_submitted(&self) -> bool {
        !self.shared.submitted.swap(true, Ordering::AcqRel)
    }

    /// `Pending → Running`. False if the operation was cancelled while queued.
    pub(crate) fn admit(&self) -> bool {
        let mut slot = self.shared.slot.lock();
        if slot.state != OperationState::Pending {
            return false;
        }
        slot.state = OperationState::Running;
        drop(slot);

        self.shared.state.send_replace(OperationState::Running);
        true
    }

    /// Fetch, decode, and finish. Returns early if cancelled mid-flight.
    pub(crate) async fn run(self, transport: Arc<dyn Transport>) {
        let request = self.shared.request.clone();
        let response = tokio::select! {
            biased;
            () = self.cancelled() => {
                debug!(id = %self.shared.id, "in-flight request abandoned");
                return;
            }
            response = transport.execute(request) => response,
        };

        match response
            .map_err(OperationError::from)
            .and_then(|response| parse_response::<T>(&response, &self.shared.config))
        {
            Ok(decoded) => self.finish(Ok(decoded.models), decoded.report),
            Err(error) => self.finish(Err(error), DecodeReport::default()),
        }
    }

    async fn cancelled(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state
            .wait_for(|state| *state == OperationState::Cancelled)
            .await;
    }

    /// `Running → Completed | Failed`, publish, then fire the callback.
    ///
    /// The state goes out on the watch channel before the callback runs, so
    /// waiters wake even if the callback panics.
    fn finish(&self, outcome: Outcome<T>, report: DecodeReport) {
        let next = match &outcome {
            Ok(_) => OperationState::Completed,
            Err(_) => OperationState::Failed,
        };

        let mut slot = self.shared.slot.lock();
        if slot.state != OperationState::Running {
            debug!(id = %self.shared.id, state = ?slot.state, "late reply discarded");
            return;
        }
        slot.state = next;
        slot.outcome = Some(outcome);
        slot.report = report;
        let completion = slot.completion.take();
        drop(slot);

        self.shared.state.send_replace(next);
        debug!(id = %self.shared.id, state = ?next, "operation finished");
        if let Some(completion) = completion {
            completion(self);
        }
    }
}

/// Turn a raw response into models: status check, envelope, API code, records.
///
/// When the body cannot be decoded, models that know how to read themselves
/// from response headers get a second chance.
pub fn parse_response<T: Model>(
    response: &HttpResponse,
    config: &DecodeConfig,
) -> Result<Decoded<T>, OperationError> {
    check_status(response)?;
    match decode_body(response, config) {
        Err(OperationError::Decode(error)) => match T::from_headers(response) {
            Some(model) => {
                debug!(%error, "body unusable, model read from headers");
                Ok(Decoded {
                    models: vec![model],
                    report: DecodeReport::default(),
                })
            }
            None => Err(error.into()),
        },
        decoded => decoded,
    }
}

fn decode_body<T: Model>(response: &HttpResponse, config: &DecodeConfig) -> Result<Decoded<T>, OperationError> {
    let envelope = decode_envelope(&response.body, config)?;
    if let Some(code) = envelope.code().filter(|code| !(200..300).contains(code)) {
        return Err(TransportError::Status {
            status: code,
            body: envelope.text().unwrap_or_default().to_string(),
        }
        .into());
    }
    Ok(decode_models(&envelope, config)?)
}

pub(crate) type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Type-erased view of an operation, as held by the queue.
pub(crate) trait Job: Send + Sync {
    fn id(&self) -> OperationId;
    fn admit(&self) -> bool;
    fn cancel(&self) -> bool;
    fn run(&self, transport: Arc<dyn Transport>) -> JobFuture;
}

impl<T: Model> Job for Operation<T> {
    fn id(&self) -> OperationId {
        Operation::id(self)
    }

    fn admit(&self) -> bool {
        Operation::admit(self)
    }

    fn cancel(&self) -> bool {
        Operation::cancel(self)
    }

    fn run(&self, transport: Arc<dyn Transport>) -> JobFuture {
        Box::pin(self.clone().run(transport))
    }
}
