//! # Network Module
//!
//! The request front-end: a newline-delimited JSON protocol served over a
//! Unix stream socket. One JSON object per line in, one JSON object per
//! line out; the client controls connection lifetime.

pub mod protocol;
pub mod socket;

pub use socket::SocketServer;
