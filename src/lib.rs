//! Scriptorium: a distributed, sentence-granular collaborative text store.
//!
//! A name server (`nm`) indexes files and folders held by replicated
//! storage servers (`ss`); clients discover a file's home storage server via
//! the name server, then edit it at sentence granularity directly against
//! that storage server (`client`). All three roles speak the same framed
//! wire protocol (`wire`).

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod nm;
pub mod ss;
pub mod util;
pub mod wire;
