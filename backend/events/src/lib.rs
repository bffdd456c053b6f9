//! `enclave-events`: binds object-created notifications to the job runner.
//!
//! Delivery is asynchronous and at-least-once; consumers dedupe on
//! [`DeliveryKey`].

pub mod notification;
pub mod wiring;

pub use notification::{output_key, parse_notification, DeliveryKey, ObjectNotification};
pub use wiring::{EventBinding, EventType, EventWiring};
