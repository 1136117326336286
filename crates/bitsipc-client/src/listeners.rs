//! Local callbacks for inbound events and requests.
//!
//! Event callbacks are kept per event name as an `Arc<Vec<_>>` snapshot that
//! is replaced wholesale on registration. The dispatch loop clones the `Arc`
//! and runs callbacks after the lock is released, so a registration made
//! from inside a callback never deadlocks and readers never see a half
//! updated list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;

use crate::message::{Message, Scopes};

/// Callback invoked with the positional arguments of an inbound event.
pub type EventCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Handler for inbound requests. `Err` is returned to the requester in the
/// response's `err` field.
pub type RequestHandler = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Event callbacks, request handlers, and the registrations announced to
/// the message center.
#[derive(Default)]
pub struct ListenerRegistry {
    events: RwLock<HashMap<String, Arc<Vec<EventCallback>>>>,
    requests: RwLock<HashMap<String, RequestHandler>>,
    registrations: Mutex<Vec<Message>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the listeners of `event`.
    ///
    /// Returns the `addEventListener` message to send to the message center.
    pub fn add_event_listener<F>(&self, event: &str, scopes: &Scopes, callback: F) -> Message
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        {
            let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
            let current = events.get(event).map(|list| list.as_slice()).unwrap_or(&[]);
            let mut next: Vec<EventCallback> = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::new(callback));
            events.insert(event.to_string(), Arc::new(next));
        }

        let registration = Message::add_event_listener(event, scopes);
        let mut log = self.log();
        if !log.contains(&registration) {
            log.push(registration.clone());
        }
        registration
    }

    /// Install `handler` for requests named `event`, replacing any previous
    /// handler.
    ///
    /// Returns the `addRequestListener` message to send to the message center.
    pub fn add_request_listener<F>(&self, event: &str, scopes: &Scopes, handler: F) -> Message
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.to_string(), Arc::new(handler));

        let registration = Message::add_request_listener(event, scopes);
        let mut log = self.log();
        log.retain(|m| !matches!(m, Message::AddRequestListener { event: e, .. } if e == event));
        log.push(registration.clone());
        registration
    }

    /// Snapshot of the callbacks for `event`, in registration order.
    pub fn event_callbacks(&self, event: &str) -> Option<Arc<Vec<EventCallback>>> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
    }

    /// Current request handler for `event`.
    pub fn request_handler(&self, event: &str) -> Option<RequestHandler> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
    }

    /// Registration messages to replay after (re)connecting, in the order
    /// they were first made.
    pub fn registrations(&self) -> Vec<Message> {
        self.log().clone()
    }

    pub fn event_listener_count(&self, event: &str) -> usize {
        self.event_callbacks(event).map_or(0, |list| list.len())
    }

    pub fn has_request_handler(&self, event: &str) -> bool {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(event)
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let requests = self.requests.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ListenerRegistry")
            .field("events", &events.keys().collect::<Vec<_>>())
            .field("requests", &requests.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn event_callbacks_keep_registration_order() {
        let reg = ListenerRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for name in ["L1", "L2", "L3"] {
            let calls = Arc::clone(&calls);
            reg.add_event_listener("e", &Scopes::none(), move |_| {
                calls.lock().unwrap().push(name);
            });
        }

        let callbacks = reg.event_callbacks("e").unwrap();
        for cb in callbacks.iter() {
            cb(&[]);
        }
        assert_eq!(*calls.lock().unwrap(), ["L1", "L2", "L3"]);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_registration() {
        let reg = ListenerRegistry::new();
        reg.add_event_listener("e", &Scopes::none(), |_| {});
        let before = reg.event_callbacks("e").unwrap();

        reg.add_event_listener("e", &Scopes::none(), |_| {});
        assert_eq!(before.len(), 1);
        assert_eq!(reg.event_listener_count("e"), 2);
    }

    #[test]
    fn request_handler_last_write_wins() {
        let reg = ListenerRegistry::new();
        reg.add_request_listener("r", &Scopes::none(), |_| Ok(json!("first")));
        reg.add_request_listener("r", &Scopes::from("s"), |_| Ok(json!("second")));

        let handler = reg.request_handler("r").unwrap();
        assert_eq!(handler(&[]).unwrap(), json!("second"));

        let regs = reg.registrations();
        assert_eq!(regs, vec![Message::add_request_listener("r", &Scopes::from("s"))]);
    }

    #[test]
    fn unknown_names_have_no_listeners() {
        let reg = ListenerRegistry::new();
        assert!(reg.event_callbacks("missing").is_none());
        assert!(reg.request_handler("missing").is_none());
        assert!(!reg.has_request_handler("missing"));
        assert_eq!(reg.event_listener_count("missing"), 0);
    }

    #[test]
    fn registrations_are_deduplicated_and_ordered() {
        let reg = ListenerRegistry::new();
        let first = reg.add_event_listener("a", &Scopes::none(), |_| {});
        reg.add_request_listener("b", &Scopes::none(), |_| Ok(Value::Null));
        let again = reg.add_event_listener("a", &Scopes::none(), |_| {});
        assert_eq!(first, again);

        let kinds: Vec<_> = reg
            .registrations()
            .iter()
            .map(|m| (m.kind(), m.event_name().map(str::to_string)))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("addEventListener", Some("a".to_string())),
                ("addRequestListener", Some("b".to_string())),
            ]
        );
    }

    #[test]
    fn callback_may_register_while_running() {
        let reg = Arc::new(ListenerRegistry::new());
        let inner = Arc::clone(&reg);
        reg.add_event_listener("e", &Scopes::none(), move |_| {
            inner.add_event_listener("other", &Scopes::none(), |_| {});
        });

        for cb in reg.event_callbacks("e").unwrap().iter() {
            cb(&[json!(1)]);
        }
        assert_eq!(reg.event_listener_count("other"), 1);
    }
}
