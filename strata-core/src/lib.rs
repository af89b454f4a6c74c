//! # Strata Core Library
//!
//! Core library for strata, a single-node two-tier key/value cache served
//! over a Unix stream socket.
//!
//! ## Architecture
//!
//! - **Bus**: typed request/response dispatch with a bounded worker pool
//! - **Storage**: the volatile RAM tier (TTL + byte-budget eviction), the
//!   durable SQLite tier, and the coordinator that routes between them
//! - **Network**: newline-delimited JSON over a Unix stream socket
//! - **Config**: JSON configuration file loading and validation
//!
//! Requests flow `socket -> coordinator -> tier(s)` and responses flow
//! back the same way; every hop is a bus dispatch, and the coordinator is
//! the only component that talks to both tiers.

pub mod bus;
pub mod config;
pub mod error;
pub mod network;
pub mod storage;

pub use error::{Result, StrataError};
