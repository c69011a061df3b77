//! Turning a run's event stream into a buffered, replayable live feed.

pub mod manager;
pub mod publisher;
pub mod sse;

pub use manager::{EventRecord, RunManager, Subscription};
pub use publisher::{RunHistory, RunPublisher, StepRunRecord};
