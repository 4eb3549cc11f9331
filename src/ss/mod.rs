//! The storage server: the sentence-granular editing engine, on-disk
//! persistence, and replica synchronization (specification §4.5-§4.6).

pub mod control;
pub mod dispatcher;
pub mod locks;
pub mod sentence;
pub mod server;
pub mod storage;

pub use server::{run, SsConfig};
