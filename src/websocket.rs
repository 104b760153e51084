//! Event-log feedback path and worker-mode startup exchange, both speaking
//! websocket to the remote controller side.

pub mod event_log;
pub mod publisher;
pub mod workload;

pub use event_log::{EventLog, EventLogEntry};
pub use publisher::publish_event_log;
pub use workload::request_workload;
