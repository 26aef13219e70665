//! End-to-end scenarios for the Data Agent router
//!
//! Each suite drives a real [`Dispatcher`](dataagent_router::Dispatcher)
//! through its transport callbacks and observes what reaches each peer:
//! - Identity binding, collisions and per-role cardinality
//! - Reconnection window behaviour
//! - Authority / operator-console arbitration
//! - Fail-closed handling and synthesized diagnostics
//! - Per-connection failure isolation
//! - Registration replay and persistence

pub mod test_utils;

#[cfg(test)]
mod identity_tests;

#[cfg(test)]
mod reconnection_tests;

#[cfg(test)]
mod permission_tests;

#[cfg(test)]
mod fail_closed_tests;

#[cfg(test)]
mod isolation_tests;

#[cfg(test)]
mod persistence_tests;
