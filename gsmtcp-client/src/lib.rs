//! Client side of the gsmtcp modem stack
//!
//! This crate turns the AT-command session into something an application can
//! use as a network connection:
//!
//! - `TcpChannel` drives the modem's single TCP connection
//! - `ModemStream` adapts a channel to `AsyncRead` / `AsyncWrite` with deadlines
//! - `Modem` ties power, registration and connection setup together

pub mod address;
pub mod channel;
pub mod modem;
pub mod stream;

pub use address::RemoteAddress;
pub use channel::TcpChannel;
pub use modem::Modem;
pub use stream::{Deadlines, ModemStream};
