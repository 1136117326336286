//! The single reader: frames in, routed messages out.
//!
//! [`run`] pulls complete frames from a [`FrameReader`] and hands each to a
//! [`Router`], which decodes it and routes it by kind. The background thread
//! and caller-driven dispatch share this code; they differ only in the
//! [`Mode`] passed to [`run`].

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use bitsipc_frame::{FrameError, FrameReader};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::correlation::CorrelationRegistry;
use crate::error::{ClientError, Result};
use crate::listeners::ListenerRegistry;
use crate::message::{correlation_key, decode, response_value, Message};
use crate::stats::ClientStats;

/// Destination for replies to inbound requests.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: &Message) -> Result<()>;
}

/// How long [`run`] keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Until stopped or the connection ends. Read timeouts only re-check
    /// the stop flag.
    Continuous,
    /// Until `n` frames were handled or one read timeout passes with no
    /// complete frame. `Bounded(0)` has no frame limit and returns only when
    /// idle, stopped or closed.
    Bounded(usize),
}

/// Why [`run`] returned.
#[derive(Debug)]
pub enum Exit {
    Stopped,
    LimitReached,
    Idle,
    Closed,
    Failed(FrameError),
}

#[derive(Debug)]
pub struct Outcome {
    pub processed: usize,
    pub exit: Exit,
}

/// Routes decoded messages to the registries.
pub struct Router<'a> {
    pub correlation: &'a CorrelationRegistry,
    pub listeners: &'a ListenerRegistry,
    pub stats: &'a ClientStats,
    pub replies: &'a dyn MessageSink,
}

impl Router<'_> {
    /// Decode and route one frame. Undecodable frames are counted and
    /// dropped.
    pub fn handle_frame(&self, frame: &[u8]) {
        if frame.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        match decode(frame) {
            Ok(message) => self.route(message),
            Err(err) => {
                self.stats.parse_error();
                warn!(error = %err, len = frame.len(), "discarding undecodable message");
            }
        }
    }

    pub fn route(&self, message: Message) {
        match message {
            Message::Event { event, params } => self.dispatch_event(&event, &params),
            Message::Request {
                event,
                request_id,
                params,
            } => self.answer_request(event, request_id, &params),
            Message::Response {
                response_id,
                err,
                params,
                result,
                ..
            } => self.deliver_response(&response_id, err, params, result),
            other => {
                self.stats.ignored_message();
                debug!(kind = other.kind(), "ignoring message");
            }
        }
    }

    fn dispatch_event(&self, event: &str, params: &[Value]) {
        let Some(callbacks) = self.listeners.event_callbacks(event) else {
            self.stats.ignored_message();
            debug!(event, "no listener for event");
            return;
        };

        trace!(event, listeners = callbacks.len(), "dispatching event");
        for callback in callbacks.iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(params))).is_err() {
                self.stats.callback_panic();
                warn!(event, "event listener panicked");
            }
        }
        self.stats.event_dispatched();
    }

    fn answer_request(&self, event: String, request_id: Value, params: &[Value]) {
        let Some(handler) = self.listeners.request_handler(&event) else {
            self.stats.unhandled_request();
            debug!(event = %event, "no handler for request, ignoring");
            return;
        };

        let outcome = match catch_unwind(AssertUnwindSafe(|| handler(params))) {
            Ok(outcome) => outcome,
            Err(_) => {
                self.stats.callback_panic();
                warn!(event = %event, "request handler panicked");
                Err(format!("request handler for '{event}' panicked"))
            }
        };
        self.stats.request_handled();

        let reply = Message::response(Some(event), request_id, outcome);
        if let Err(err) = self.replies.send(&reply) {
            warn!(error = %err, "failed to send response");
        }
    }

    fn deliver_response(
        &self,
        response_id: &Value,
        err: Option<Value>,
        params: Option<Vec<Value>>,
        result: Option<Value>,
    ) {
        let Some(id) = correlation_key(response_id) else {
            self.stats.unmatched_response();
            warn!(%response_id, "response id is neither string nor number");
            return;
        };

        let outcome = match err {
            Some(err) if is_truthy(&err) => Err(ClientError::Remote(err)),
            _ => Ok(response_value(params, result)),
        };

        if self.correlation.fulfill(&id, outcome) {
            self.stats.response_delivered();
            trace!(request_id = %id, "response delivered");
        } else {
            self.stats.unmatched_response();
            debug!(request_id = %id, "dropping response for unknown request");
        }
    }
}

/// `null`, `false`, `0` and `""` mean "no error" to the message center.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Read and route frames until `mode` is satisfied, `stop` is set, or the
/// stream ends.
pub fn run<R: Read>(
    reader: &mut FrameReader<R>,
    router: &Router<'_>,
    stop: &AtomicBool,
    mode: Mode,
) -> Outcome {
    let mut processed = 0usize;
    let exit = loop {
        if stop.load(Ordering::Acquire) {
            break Exit::Stopped;
        }
        if let Mode::Bounded(max) = mode {
            if max > 0 && processed >= max {
                break Exit::LimitReached;
            }
        }

        match reader.read_frame() {
            Ok(frame) => {
                router.handle_frame(&frame);
                processed += 1;
            }
            Err(err) if err.is_timeout() => {
                if matches!(mode, Mode::Bounded(_)) {
                    break Exit::Idle;
                }
            }
            Err(FrameError::PayloadTooLarge { size, max }) => {
                router.stats.oversized_frame();
                warn!(size, max, "dropping oversized message");
            }
            Err(_) if stop.load(Ordering::Acquire) => break Exit::Stopped,
            Err(FrameError::ConnectionClosed) => break Exit::Closed,
            Err(err) => break Exit::Failed(err),
        }
    };

    debug!(processed, exit = ?exit, "dispatch loop returned");
    Outcome { processed, exit }
}
