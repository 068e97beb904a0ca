//! Transport collaborators for the gsmtcp modem stack
//!
//! This crate provides the serial link the AT-command session talks over and
//! the GPIO pin used to toggle modem power.

pub mod gpio;
pub mod serial;

pub use gpio::{Level, PowerPin, SysfsPin};
#[cfg(feature = "mock")]
pub use gpio::MockPowerPin;
pub use serial::{SerialLink, SerialSettings};

use tokio::io::{AsyncRead, AsyncWrite};

/// Byte link to a modem
///
/// Anything readable and writable can carry AT traffic: a serial port in
/// production, an in-memory duplex pipe in tests.
pub trait Link: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Link for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
