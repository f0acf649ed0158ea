//! Integration test utilities for the gateway client
//!
//! Provides a scripted in-process gateway and event collectors for
//! end-to-end tests over a real WebSocket.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
