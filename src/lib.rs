//! Tollgate - Multi-tier Admission Control
//!
//! This crate decides, for every inbound HTTP request, whether the caller has
//! exceeded any of several fixed-window rate ceilings on the route it hit.
//! Counters live in a shared store (Redis in production) so any number of
//! server processes enforce the same limits.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
