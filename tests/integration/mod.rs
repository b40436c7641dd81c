//! Integration test suite for foreman.
//!
//! These tests exercise the engine end to end: planning with bounded
//! retry, validation, worker selection, dependency-ordered execution,
//! fallback recovery, and cancellation. Every external boundary (plan
//! generator, worker, tool invoker) is a deterministic fake, so the
//! suite is safe to run anywhere.
//!
//! # Test Categories
//!
//! - `planning`: controller/validator replanning loop
//! - `execution`: scheduler ordering, skips, fallback retry
//! - `recovery`: circuit breaker, degraded mode, cancellation


mod execution;
mod planning;
mod recovery;
