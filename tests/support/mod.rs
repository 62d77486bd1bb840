//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod fake_connectivity;
pub mod socket_guard;
