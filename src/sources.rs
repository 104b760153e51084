//! Event source plugin contract and the registry of built-in sources.

pub mod builtin;
pub mod plugin;

pub use builtin::SourceRegistry;
pub use plugin::{EventSource, SendStatus, SourceContext, SourceFuture};
