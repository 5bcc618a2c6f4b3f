//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `apple` / `google` - store signature verification, server APIs, notification mapping
//! - `postgres` - persistence for every repository port
//! - `memory` - in-memory ports and scriptable store fakes
//! - `events` - `SubscriptionChanged` publishers
//! - `http` - axum REST surface and store webhook endpoints

pub mod apple;
pub mod events;
pub mod google;
pub mod http;
pub mod memory;
pub mod postgres;
