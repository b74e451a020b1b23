//! Event matching.
//!
//! Given an incoming event and the subscription index, find the
//! subscriptions whose filters accept it:
//! - Candidates come from the event-kind index (plus the wildcard-event
//!   bucket, depending on [`WildcardEvents`])
//! - Each filter field with values must contain the event's value
//! - Filter fields the [`FieldRegistry`] does not know are ignored
//!
//! # Example
//!
//! ```ignore
//! let matcher = EventMatcher::with_fields(WebhookEvent::field_registry());
//! let event = WebhookEvent::new("jira:issue_created").with_field("project", "ABC");
//! let targets = matcher.match_targets(&index, &event);
//! ```

mod engine;
mod event;

pub use engine::{EventMatcher, MatcherConfig, WildcardEvents};
pub use event::{Event, FieldRegistry, WebhookEvent};
