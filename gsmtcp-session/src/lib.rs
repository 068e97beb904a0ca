//! Session layer for the gsmtcp modem stack
//!
//! This crate provides the AT-command session engine and the two components
//! built directly on it: power control and network registration.

pub mod command;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod pattern;
pub mod power;
pub mod registration;
pub mod statistics;

pub use command::{CommandGuard, CommandSession, LINE_TERMINATOR};
pub use gsmtcp_core::{GsmError, GsmResult};
pub use pattern::{markers, Match, ResponsePattern};
pub use power::PowerController;
pub use registration::{NetworkRegistrar, RegistrationStatus};
pub use statistics::SessionStatistics;
