//! # notify-hub
//!
//! Push-notification fan-out for plantview live sessions.
//!
//! Every viewer session registers a [`Subscriber`] (optionally filtered to
//! one server) and drains its bounded queue, typically into an SSE stream.
//! Producers call [`NotificationHub::broadcast`], which never blocks and
//! never applies backpressure: a full queue loses that event for that
//! subscriber only. Delivery is at-most-once with no replay.

mod event;
mod hub;

pub use event::HubEvent;
pub use hub::{NotificationHub, Subscriber, SubscriberId};
