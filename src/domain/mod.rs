//! Domain layer containing conversation types and polling policy.
//!
//! # Module Organization
//!
//! - `conversation` - Handles, messages, run states, reply extraction
//! - `backoff` - Capped exponential poll schedule

pub mod backoff;
pub mod conversation;
