//! Remote controller integration: HTTP client, config probe, and the auth
//! header plumbing it needs.

pub mod auth;
pub mod client;

pub use client::{ControllerClient, ControllerInfo, ControllerParams};
