//! Model events and the observer chain.
//!
//! Mutating entry points build an [`Event`] after a successful change and
//! hand it to an [`ObserverChain`]. Observers run synchronously, in
//! registration order, on the caller's task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Realm lifecycle
    /// Realm created and bootstrapped.
    RealmPostCreate,
    /// Realm removed.
    RealmRemoved,

    // Identity providers
    /// Identity provider added.
    IdentityProviderAdded,
    /// Identity provider updated.
    IdentityProviderUpdated,
    /// Identity provider deleted.
    IdentityProviderRemoved,
    /// Identity provider detached from one federation but kept.
    FederationMembershipDetached,

    // Federations
    /// Federation added.
    FederationAdded,
    /// Federation updated.
    FederationUpdated,
    /// Federation removed.
    FederationRemoved,
    /// A sync cycle finished.
    FederationSynced,
    /// A sync cycle was abandoned.
    FederationSyncFailed,
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// A model event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Type of event.
    pub event_type: EventType,

    /// Outcome of the event.
    pub outcome: EventOutcome,

    /// Realm the event belongs to.
    pub realm_id: Option<Uuid>,

    /// Federation involved, if any.
    pub federation_id: Option<Uuid>,

    /// Identifier of the affected resource (realm name, provider alias).
    pub resource: Option<String>,

    /// Error message (for failure events).
    pub error: Option<String>,

    /// Additional details as key-value pairs.
    pub details: Vec<(String, String)>,
}

impl Event {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Returns the value of a detail entry.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Builder for creating events.
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    realm_id: Option<Uuid>,
    federation_id: Option<Uuid>,
    resource: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            realm_id: None,
            federation_id: None,
            resource: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the realm ID.
    #[must_use]
    pub const fn realm(mut self, realm_id: Uuid) -> Self {
        self.realm_id = Some(realm_id);
        self
    }

    /// Sets the federation ID.
    #[must_use]
    pub const fn federation(mut self, federation_id: Uuid) -> Self {
        self.federation_id = Some(federation_id);
        self
    }

    /// Sets the affected resource.
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.push((key.into(), value.to_string()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            realm_id: self.realm_id,
            federation_id: self.federation_id,
            resource: self.resource,
            error: self.error,
            details: self.details,
        }
    }
}

// ============================================================================
// Observers
// ============================================================================

/// Receives model events.
///
/// Called synchronously after the mutation has been persisted. Implementations
/// must not block.
pub trait EventObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &Event);
}

/// Ordered list of observers.
#[derive(Default, Clone)]
pub struct ObserverChain {
    observers: Arc<RwLock<Vec<Arc<dyn EventObserver>>>>,
}

impl ObserverChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observer.
    pub fn register(&self, observer: Arc<dyn EventObserver>) {
        self.observers.write().push(observer);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(self, observer: Arc<dyn EventObserver>) -> Self {
        self.register(observer);
        self
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Returns true if no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Delivers an event to every observer in registration order.
    pub fn notify(&self, event: &Event) {
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_event(event);
        }
    }
}

impl std::fmt::Debug for ObserverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverChain")
            .field("observers", &self.len())
            .finish()
    }
}

/// Writes every event to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn on_event(&self, event: &Event) {
        match event.outcome {
            EventOutcome::Success => tracing::info!(
                event_type = ?event.event_type,
                realm_id = ?event.realm_id,
                federation_id = ?event.federation_id,
                resource = ?event.resource,
                "model event"
            ),
            EventOutcome::Failure => tracing::warn!(
                event_type = ?event.event_type,
                realm_id = ?event.realm_id,
                federation_id = ?event.federation_id,
                resource = ?event.resource,
                error = ?event.error,
                "model event failed"
            ),
        }
    }
}

/// Keeps events in memory. Used by tests.
#[derive(Debug, Default)]
pub struct InMemoryObserver {
    events: Mutex<Vec<Event>>,
}

impl InMemoryObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns recorded events of one type.
    #[must_use]
    pub fn of_type(&self, event_type: EventType) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Drops every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventObserver for InMemoryObserver {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_builder_creates_success_event() {
        let realm_id = Uuid::now_v7();
        let federation_id = Uuid::now_v7();

        let event = Event::builder(EventType::IdentityProviderAdded)
            .realm(realm_id)
            .federation(federation_id)
            .resource("idp-1")
            .detail("provider_type", "saml")
            .build();

        assert_eq!(event.event_type, EventType::IdentityProviderAdded);
        assert_eq!(event.outcome, EventOutcome::Success);
        assert_eq!(event.realm_id, Some(realm_id));
        assert_eq!(event.federation_id, Some(federation_id));
        assert_eq!(event.resource.as_deref(), Some("idp-1"));
        assert_eq!(event.detail("provider_type"), Some("saml"));
        assert!(event.error.is_none());
    }

    #[test]
    fn event_builder_creates_failure_event() {
        let event = Event::builder(EventType::FederationSyncFailed)
            .failure("metadata fetch timed out")
            .build();

        assert_eq!(event.outcome, EventOutcome::Failure);
        assert_eq!(event.error.as_deref(), Some("metadata fetch timed out"));
    }

    struct Tagging {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl EventObserver for Tagging {
        fn on_event(&self, _event: &Event) {
            self.log.lock().push(self.tag);
        }
    }

    #[test]
    fn chain_notifies_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ObserverChain::new();
        for tag in ["first", "second", "third"] {
            chain.register(Arc::new(Tagging {
                tag,
                log: Arc::clone(&log),
            }));
        }

        chain.notify(&Event::builder(EventType::RealmPostCreate).build());

        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn in_memory_observer_filters_by_type() {
        let recorder = Arc::new(InMemoryObserver::new());
        let chain = ObserverChain::new().with(recorder.clone());

        chain.notify(&Event::builder(EventType::RealmPostCreate).build());
        chain.notify(&Event::builder(EventType::RealmRemoved).build());

        assert_eq!(recorder.events().len(), 2);
        assert_eq!(recorder.of_type(EventType::RealmRemoved).len(), 1);
        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
