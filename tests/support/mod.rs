//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod recording_host;
pub mod socket_guard;
