//! `Huddle` broker library.
//!
//! Exposes the broker server for use in tests and embedding. The broker
//! accepts WebSocket connections, tracks topic subscriptions, and fans every
//! publish out to all current subscribers of its topic.

pub mod broker;
pub mod config;
