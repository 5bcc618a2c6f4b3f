//! Event publishing adapters.
//!
//! - `TracingEventPublisher` - structured log output (default)
//! - `InMemoryEventPublisher` - captures events for tests

mod in_memory;
mod tracing_publisher;

pub use in_memory::InMemoryEventPublisher;
pub use tracing_publisher::TracingEventPublisher;
