//! # confab-server
//!
//! The confab chat relay server: an axum WebSocket endpoint driving the
//! [`confab_core`] session coordinator.
//!
//! Exposed as a library so integration tests can run the relay on an
//! ephemeral port; the `confab` binary is a thin wrapper around
//! [`handlers::run_server`].

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod switchboard;
