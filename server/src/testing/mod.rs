//! Testing utilities for driving the coordinator without real sockets.
//!
//! Each test client is a plain outbound queue registered with the router,
//! so every routed event can be inspected synchronously.

mod harness;


pub use harness::{TestClient, TestCoordinator};
