//! Entities, value objects and the ports the application layer depends on.
//!
//! Nothing in here performs I/O; the fee and aggregation functions are pure
//! and the entities only validate and apply their own transitions.

pub mod event;
pub mod fee;
pub mod ids;
pub mod money;
pub mod panel;
pub mod payout;
pub mod ports;
pub mod settlement;
pub mod verification;
pub mod verifier_payout;
