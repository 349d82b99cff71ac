//! `Huddle`: decentralized presence and membership over a pub/sub topic.
//!
//! Every client keeps its own view of who is online, built only from the
//! JOIN/ALIVE/EXIT/KICK broadcasts it observes on the shared topic. There is
//! no server-side membership logic.

pub mod config;
pub mod membership;
pub mod net;
pub mod shell;
pub mod transport;
