//! Portfolio Chat - conversation bridge for the portfolio chat widget.
//!
//! Serves a stateless chat endpoint on top of a hosted, stateful
//! conversation API. Each call resolves (or mints) a conversation handle,
//! appends the visitor's prompt, and returns the reply either buffered or
//! as a relayed event stream.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
