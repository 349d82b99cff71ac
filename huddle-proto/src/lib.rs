//! Shared protocol definitions for the `Huddle` wire format.

pub mod broker;
pub mod codec;
pub mod message;
