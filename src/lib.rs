//! projectionkit - exactly-once projections
//!
//! Tracks an opaque version token per `(handler, resource)` and swaps it with
//! optimistic concurrency in the same unit of work as the projection's own
//! writes, so redelivered or raced events are applied at most once.

pub mod config;
pub mod handler;
pub mod storage;
pub mod utils;
