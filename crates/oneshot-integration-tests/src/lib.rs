//! Integration test crate for the one-shot negotiation crates.
//!
//! This crate exists solely to run tests that drive agents from both
//! `oneshot-core` and `oneshot-agent` together. It has no public API.

#![forbid(unsafe_code)]
