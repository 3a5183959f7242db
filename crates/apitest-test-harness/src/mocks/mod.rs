//! Mock servers for exercising the client end to end.

pub mod network;

pub use network::*;
