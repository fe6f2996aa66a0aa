//! Event bus
//!
//! Named publish/subscribe between components. Every component owns an
//! [`EventBus`]; all buses of one player share an [`EventHub`], the routing
//! table that maps `(target component, event name)` to registrations.
//!
//! Guarantees:
//! - listeners of one trigger run in registration order, over a snapshot of
//!   the route taken before the first callback
//! - a `once` listener is unlinked before it is invoked, so it can never
//!   fire twice, not even from a re-entrant trigger
//! - a panicking listener is caught and logged with its owner's name; its
//!   siblings still run and the trigger returns normally
//! - dropping a bus removes every registration it holds and every
//!   registration targeting it
//!
//! The bus is single-threaded (`Rc`/`RefCell`). Signals from engine threads
//! are marshaled through [`crate::engine::signal_channel`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::events::EventPayload;
use crate::types::{ComponentId, ListenerId};

type Callback = Rc<dyn Fn(Option<&EventPayload>)>;

struct Registration {
    event: String,
    target: ComponentId,
    owner: ComponentId,
    owner_name: Rc<str>,
    callback: Callback,
    once: bool,
}

#[derive(Default)]
struct HubState {
    registrations: HashMap<ListenerId, Registration>,
    routes: HashMap<ComponentId, HashMap<String, Vec<ListenerId>>>,
}

impl HubState {
    fn insert(&mut self, id: ListenerId, registration: Registration) {
        self.routes
            .entry(registration.target)
            .or_default()
            .entry(registration.event.clone())
            .or_default()
            .push(id);
        self.registrations.insert(id, registration);
    }

    fn unlink(&mut self, id: ListenerId) -> Option<Registration> {
        let registration = self.registrations.remove(&id)?;
        if let Some(events) = self.routes.get_mut(&registration.target) {
            if let Some(ids) = events.get_mut(&registration.event) {
                ids.retain(|candidate| *candidate != id);
                if ids.is_empty() {
                    events.remove(&registration.event);
                }
            }
            if events.is_empty() {
                self.routes.remove(&registration.target);
            }
        }
        Some(registration)
    }

    /// Callback to invoke for `id`, unlinking it first when it is one-shot.
    fn take_for_dispatch(&mut self, id: ListenerId) -> Option<(Callback, Rc<str>)> {
        let once = self.registrations.get(&id)?.once;
        if once {
            let registration = self.unlink(id)?;
            return Some((registration.callback, registration.owner_name));
        }
        let registration = self.registrations.get(&id)?;
        Some((
            Rc::clone(&registration.callback),
            Rc::clone(&registration.owner_name),
        ))
    }
}

/// Routing table shared by the buses of one player
#[derive(Clone, Default)]
pub struct EventHub {
    state: Rc<RefCell<HubState>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of live registrations
    pub fn listener_count(&self) -> usize {
        self.state.borrow().registrations.len()
    }

    fn register(&self, registration: Registration) -> ListenerId {
        let id = ListenerId::new();
        self.state.borrow_mut().insert(id, registration);
        id
    }

    fn remove(&self, id: ListenerId, owner: ComponentId) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            match state.registrations.get(&id) {
                Some(registration) if registration.owner == owner => state.unlink(id),
                _ => None,
            }
        };
        removed.is_some()
    }

    fn remove_where(&self, predicate: impl Fn(&Registration) -> bool) -> usize {
        // Unlinked registrations are dropped after the borrow ends; their
        // closures may own buses whose Drop re-enters the hub.
        let removed: Vec<Registration> = {
            let mut state = self.state.borrow_mut();
            let ids: Vec<ListenerId> = state
                .registrations
                .iter()
                .filter(|(_, registration)| predicate(registration))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| state.unlink(id)).collect()
        };
        removed.len()
    }

    fn owned_by(&self, owner: ComponentId) -> usize {
        self.state
            .borrow()
            .registrations
            .values()
            .filter(|registration| registration.owner == owner)
            .count()
    }

    fn dispatch(&self, target: ComponentId, event: &str, payload: Option<&EventPayload>) -> usize {
        let snapshot: Vec<ListenerId> = self
            .state
            .borrow()
            .routes
            .get(&target)
            .and_then(|events| events.get(event))
            .cloned()
            .unwrap_or_default();

        let mut invoked = 0;
        for id in snapshot {
            // Removed by an earlier callback of this trigger
            let Some((callback, owner)) = self.state.borrow_mut().take_for_dispatch(id) else {
                continue;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(payload)));
            if let Err(cause) = outcome {
                error!(
                    event,
                    component = %owner,
                    listener = %id,
                    panic = panic_message(cause.as_ref()),
                    "listener crashed while handling event"
                );
            }
            invoked += 1;
        }
        invoked
    }

    fn downgrade(&self) -> Weak<RefCell<HubState>> {
        Rc::downgrade(&self.state)
    }

    fn ptr_eq(&self, other: &EventHub) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Anything that publishes events through its own bus
pub trait EventSource {
    fn event_bus(&self) -> &EventBus;
}

impl EventSource for EventBus {
    fn event_bus(&self) -> &EventBus {
        self
    }
}

impl<T: EventSource + ?Sized> EventSource for Rc<T> {
    fn event_bus(&self) -> &EventBus {
        (**self).event_bus()
    }
}

/// A component's view of the hub: its identity, the registrations it owns
/// and the events it publishes.
pub struct EventBus {
    id: ComponentId,
    name: Rc<str>,
    hub: EventHub,
    /// Hubs other than `hub` where this bus holds registrations
    peers: RefCell<Vec<Weak<RefCell<HubState>>>>,
}

impl EventBus {
    pub fn new(hub: &EventHub, name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            id: ComponentId::new(),
            name: Rc::from(name),
            hub: hub.clone(),
            peers: RefCell::new(Vec::new()),
        }
    }

    /// A bus on a private hub
    pub fn standalone(name: impl Into<String>) -> Self {
        Self::new(&EventHub::new(), name)
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Subscribe to events this component triggers
    pub fn on<F>(&self, event: impl AsRef<str>, callback: F) -> Result<ListenerId>
    where
        F: Fn(Option<&EventPayload>) + 'static,
    {
        self.subscribe(self, event.as_ref(), Rc::new(callback), false)
    }

    /// Like [`EventBus::on`], removed right before its first invocation
    pub fn once<F>(&self, event: impl AsRef<str>, callback: F) -> Result<ListenerId>
    where
        F: Fn(Option<&EventPayload>) + 'static,
    {
        self.subscribe(self, event.as_ref(), Rc::new(callback), true)
    }

    /// Subscribe to events `source` triggers, on behalf of this component
    pub fn listen_to<S, F>(&self, source: &S, event: impl AsRef<str>, callback: F) -> Result<ListenerId>
    where
        S: EventSource + ?Sized,
        F: Fn(Option<&EventPayload>) + 'static,
    {
        self.subscribe(source.event_bus(), event.as_ref(), Rc::new(callback), false)
    }

    pub fn listen_to_once<S, F>(
        &self,
        source: &S,
        event: impl AsRef<str>,
        callback: F,
    ) -> Result<ListenerId>
    where
        S: EventSource + ?Sized,
        F: Fn(Option<&EventPayload>) + 'static,
    {
        self.subscribe(source.event_bus(), event.as_ref(), Rc::new(callback), true)
    }

    fn subscribe(&self, target: &EventBus, event: &str, callback: Callback, once: bool) -> Result<ListenerId> {
        if event.is_empty() {
            return Err(Error::EmptyEventName);
        }
        if !target.hub.ptr_eq(&self.hub) {
            self.remember_peer(&target.hub);
        }
        let id = target.hub.register(Registration {
            event: event.to_string(),
            target: target.id,
            owner: self.id,
            owner_name: Rc::clone(&self.name),
            callback,
            once,
        });
        trace!(component = %self.name, source = %target.name, event, listener = %id, once, "listener registered");
        Ok(id)
    }

    fn remember_peer(&self, hub: &EventHub) {
        let mut peers = self.peers.borrow_mut();
        peers.retain(|peer| peer.strong_count() > 0);
        let known = peers
            .iter()
            .filter_map(Weak::upgrade)
            .any(|state| Rc::ptr_eq(&state, &hub.state));
        if !known {
            peers.push(hub.downgrade());
        }
    }

    fn hubs(&self) -> Vec<EventHub> {
        let mut hubs = vec![self.hub.clone()];
        hubs.extend(
            self.peers
                .borrow()
                .iter()
                .filter_map(Weak::upgrade)
                .map(|state| EventHub { state }),
        );
        hubs
    }

    /// Remove a registration this bus holds.
    ///
    /// Unknown ids (already removed, or owned by another component) are a
    /// recoverable lookup failure.
    pub fn off(&self, id: ListenerId) -> Result<()> {
        if self.hubs().iter().any(|hub| hub.remove(id, self.id)) {
            trace!(component = %self.name, listener = %id, "listener removed");
            return Ok(());
        }
        error!(component = %self.name, listener = %id, "could not find any listener with that id");
        Err(Error::ListenerNotFound { id })
    }

    /// Equivalent to [`EventBus::off`]
    pub fn stop_listening_to(&self, id: ListenerId) -> Result<()> {
        self.off(id)
    }

    /// Remove every registration this bus holds, whatever it targets.
    /// Idempotent.
    pub fn stop_listening(&self) {
        let owner = self.id;
        let removed: usize = self
            .hubs()
            .iter()
            .map(|hub| hub.remove_where(|registration| registration.owner == owner))
            .sum();
        self.peers.borrow_mut().clear();
        if removed > 0 {
            debug!(component = %self.name, removed, "stopped listening");
        }
    }

    /// Number of registrations this bus holds
    pub fn listener_count(&self) -> usize {
        self.hubs().iter().map(|hub| hub.owned_by(self.id)).sum()
    }

    /// Publish `event` without payload. Returns the number of listeners run.
    pub fn trigger(&self, event: impl AsRef<str>) -> usize {
        self.publish(event.as_ref(), None)
    }

    /// Publish `event` with a payload
    pub fn trigger_with(&self, event: impl AsRef<str>, payload: EventPayload) -> usize {
        self.publish(event.as_ref(), Some(&payload))
    }

    fn publish(&self, event: &str, payload: Option<&EventPayload>) -> usize {
        trace!(component = %self.name, event, ?payload, "trigger");
        self.hub.dispatch(self.id, event, payload)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.stop_listening();
        let target = self.id;
        self.hub.remove_where(|registration| registration.target == target);
    }
}
