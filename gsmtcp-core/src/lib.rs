//! Core types for the gsmtcp modem stack
//!
//! This crate provides the error taxonomy and the session configuration
//! shared by every layer, from the AT-command session up to the JSON-RPC
//! client.

pub mod config;
pub mod error;

pub use config::{ConfigOption, SessionConfig};
pub use error::{GsmError, GsmResult};
