//! Verification and settlement back office for a digital-artifact marketplace.
//!
//! The crate is split the same way throughout: `domain` holds entities, pure
//! fee and aggregation math, and the ports; `application` orchestrates those
//! against the ports; `infrastructure` and `interfaces` provide adapters.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
