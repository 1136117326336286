use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for traffic the dispatch loop handled or dropped.
///
/// Drops never interrupt dispatch; these counters are how they become
/// visible.
#[derive(Debug, Default)]
pub struct ClientStats {
    events_dispatched: AtomicU64,
    requests_handled: AtomicU64,
    responses_delivered: AtomicU64,
    parse_errors: AtomicU64,
    oversized_frames: AtomicU64,
    unmatched_responses: AtomicU64,
    unhandled_requests: AtomicU64,
    ignored_messages: AtomicU64,
    callback_panics: AtomicU64,
}

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub events_dispatched: u64,
    pub requests_handled: u64,
    pub responses_delivered: u64,
    pub parse_errors: u64,
    pub oversized_frames: u64,
    pub unmatched_responses: u64,
    pub unhandled_requests: u64,
    pub ignored_messages: u64,
    pub callback_panics: u64,
}

impl StatsSnapshot {
    /// Messages dropped for any reason.
    pub fn dropped(&self) -> u64 {
        self.parse_errors
            + self.oversized_frames
            + self.unmatched_responses
            + self.unhandled_requests
            + self.ignored_messages
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl ClientStats {
    pub(crate) fn event_dispatched(&self) {
        bump(&self.events_dispatched);
    }

    pub(crate) fn request_handled(&self) {
        bump(&self.requests_handled);
    }

    pub(crate) fn response_delivered(&self) {
        bump(&self.responses_delivered);
    }

    pub(crate) fn parse_error(&self) {
        bump(&self.parse_errors);
    }

    pub(crate) fn oversized_frame(&self) {
        bump(&self.oversized_frames);
    }

    pub(crate) fn unmatched_response(&self) {
        bump(&self.unmatched_responses);
    }

    pub(crate) fn unhandled_request(&self) {
        bump(&self.unhandled_requests);
    }

    pub(crate) fn ignored_message(&self) {
        bump(&self.ignored_messages);
    }

    pub(crate) fn callback_panic(&self) {
        bump(&self.callback_panics);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            events_dispatched: load(&self.events_dispatched),
            requests_handled: load(&self.requests_handled),
            responses_delivered: load(&self.responses_delivered),
            parse_errors: load(&self.parse_errors),
            oversized_frames: load(&self.oversized_frames),
            unmatched_responses: load(&self.unmatched_responses),
            unhandled_requests: load(&self.unhandled_requests),
            ignored_messages: load(&self.ignored_messages),
            callback_panics: load(&self.callback_panics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = ClientStats::default();
        stats.parse_error();
        stats.parse_error();
        stats.unmatched_response();
        stats.event_dispatched();

        let snap = stats.snapshot();
        assert_eq!(snap.parse_errors, 2);
        assert_eq!(snap.unmatched_responses, 1);
        assert_eq!(snap.events_dispatched, 1);
        assert_eq!(snap.dropped(), 3);
    }

    #[test]
    fn snapshot_serializes_flat() {
        let json = serde_json::to_value(ClientStats::default().snapshot()).unwrap();
        assert_eq!(json["callback_panics"], 0);
        assert_eq!(json.as_object().unwrap().len(), 9);
    }
}
