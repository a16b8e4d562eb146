//! # Batch Relay
//!
//! Library for the implementation of the Batch Relay.

pub mod batcher;
pub mod capacity;
pub mod chain;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod nonce;
pub mod spawn;
pub mod store;
pub mod types;
