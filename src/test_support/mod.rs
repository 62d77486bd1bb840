//! Helpers shared by unit tests.

pub mod fake_connectivity;
#[path = "../../tests/support/socket_guard.rs"]
pub mod socket_guard;
