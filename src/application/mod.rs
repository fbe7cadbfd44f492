//! Application layer: the engines that drive domain entities through their
//! lifecycles against the ports.
//!
//! Engines hold no state of their own beyond `Arc`ed ports and are cheap to
//! clone. Concurrency control lives in the stores' conditional writes. Every
//! mutating operation returns an [`Outcome`](crate::domain::event::Outcome)
//! whose events the caller hands to an [`events::EventDispatcher`].

pub mod assignment;
pub mod checks;
pub mod events;
pub mod panel;
pub mod payout;
pub mod platform;
pub mod settlement;
pub mod verification;
pub mod verifier_payout;
