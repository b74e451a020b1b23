//! Incoming events and the fields subscriptions can filter on.

use crate::types::{EVENTS_FIELD, EVENT_FIELD, ISSUE_TYPE_FIELD, PROJECT_FIELD};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An incoming event that can be matched against subscriptions.
pub trait Event {
    /// Discriminator naming the category of event (e.g. "jira:issue_created").
    fn kind(&self) -> &str;
}

type Accessor<E> = Box<dyn Fn(&E) -> Option<&str> + Send + Sync>;

/// Filter field names mapped to accessors over an event type.
///
/// Filter fields that are not registered are ignored during matching. The
/// `events` field is always resolved to [`Event::kind`].
pub struct FieldRegistry<E> {
    accessors: HashMap<String, Accessor<E>>,
}

impl<E: Event> FieldRegistry<E> {
    /// Registry knowing only the `events` field.
    pub fn new() -> Self {
        Self {
            accessors: HashMap::new(),
        }
    }

    /// Register (or replace) the accessor for a field.
    pub fn register<F>(&mut self, name: impl Into<String>, accessor: F)
    where
        F: Fn(&E) -> Option<&str> + Send + Sync + 'static,
    {
        self.accessors.insert(name.into(), Box::new(accessor));
    }

    /// Builder form of [`FieldRegistry::register`].
    pub fn with_field<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&E) -> Option<&str> + Send + Sync + 'static,
    {
        self.register(name, accessor);
        self
    }

    pub fn is_known(&self, name: &str) -> bool {
        name == EVENTS_FIELD || self.accessors.contains_key(name)
    }

    /// Resolve a field on an event.
    ///
    /// Outer `None`: the field is unknown. Inner `None`: known, but the event
    /// carries no value for it.
    pub fn resolve<'e>(&self, event: &'e E, name: &str) -> Option<Option<&'e str>> {
        if name == EVENTS_FIELD {
            return Some(Some(event.kind()));
        }
        self.accessors.get(name).map(|accessor| accessor(event))
    }

    /// Registered field names, `events` excluded.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }
}

impl<E: Event> Default for FieldRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for FieldRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.accessors.keys().collect();
        names.sort();
        f.debug_struct("FieldRegistry").field("fields", &names).finish()
    }
}

/// Issue tracker webhook reduced to its kind and scalar fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Webhook event kind, e.g. "jira:issue_updated".
    pub kind: String,

    /// Scalar fields by name, e.g. "project" -> "ABC".
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl WebhookEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Project key the issue belongs to.
    pub fn project(&self) -> Option<&str> {
        self.field(PROJECT_FIELD)
    }

    /// Issue type id of the issue.
    pub fn issue_type(&self) -> Option<&str> {
        self.field(ISSUE_TYPE_FIELD)
    }

    /// The event kind as a filterable field value.
    pub fn event_kind(&self) -> Option<&str> {
        Some(&self.kind)
    }

    /// Registry with the fields issue tracker subscriptions filter on.
    pub fn field_registry() -> FieldRegistry<Self> {
        FieldRegistry::new()
            .with_field(EVENT_FIELD, WebhookEvent::event_kind)
            .with_field(PROJECT_FIELD, WebhookEvent::project)
            .with_field(ISSUE_TYPE_FIELD, WebhookEvent::issue_type)
    }
}

impl Event for WebhookEvent {
    fn kind(&self) -> &str {
        &self.kind
    }
}
