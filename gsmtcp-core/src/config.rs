//! Session configuration
//!
//! Every option has a documented default. A `SessionConfig` is resolved once
//! when the modem session is created and never changes afterwards.

use crate::error::{GsmError, GsmResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Default number of registration retries
pub const DEFAULT_REGISTRATION_RETRIES: u32 = 15;
/// Default delay between registration polls
pub const DEFAULT_REGISTRATION_RETRY_DELAY: Duration = Duration::from_secs(3);
/// Default timeout for the send-size query and the `SEND OK` acknowledgement
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Default quiet period after which a data read reports end-of-data
pub const DEFAULT_READ_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

/// A single caller-supplied configuration entry
///
/// Each variant carries the typed value of exactly one option, so no
/// unchecked conversion is needed when the configuration is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOption {
    Baud(u32),
    RegistrationRetries(u32),
    RegistrationRetryDelay(Duration),
    SendTimeout(Duration),
    Verbose(bool),
    ReadIdleTimeout(Duration),
}

/// Immutable configuration of a modem session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial baud rate
    pub baud_rate: u32,
    /// Number of times a transient registration status is retried
    pub registration_retries: u32,
    /// Sleep between registration polls
    pub registration_retry_delay: Duration,
    /// Timeout for the send-size query and for `SEND OK`
    pub send_timeout: Duration,
    /// Log raw modem traffic at debug level
    pub verbose: bool,
    /// Quiet period that ends a data read
    pub read_idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            registration_retries: DEFAULT_REGISTRATION_RETRIES,
            registration_retry_delay: DEFAULT_REGISTRATION_RETRY_DELAY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            verbose: false,
            read_idle_timeout: DEFAULT_READ_IDLE_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with every option at its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a configuration from caller-supplied entries
    ///
    /// Options that are not supplied keep their default. When an option is
    /// supplied more than once the last entry wins.
    ///
    /// # Errors
    /// Returns `GsmError::InvalidConfig` if the resolved configuration is invalid
    pub fn from_options<I>(options: I) -> GsmResult<Self>
    where
        I: IntoIterator<Item = ConfigOption>,
    {
        let config = options
            .into_iter()
            .fold(Self::default(), |config, option| config.apply(option));
        config.validate()?;
        Ok(config)
    }

    fn apply(mut self, option: ConfigOption) -> Self {
        match option {
            ConfigOption::Baud(baud) => self.baud_rate = baud,
            ConfigOption::RegistrationRetries(retries) => self.registration_retries = retries,
            ConfigOption::RegistrationRetryDelay(delay) => self.registration_retry_delay = delay,
            ConfigOption::SendTimeout(timeout) => self.send_timeout = timeout,
            ConfigOption::Verbose(verbose) => self.verbose = verbose,
            ConfigOption::ReadIdleTimeout(timeout) => self.read_idle_timeout = timeout,
        }
        self
    }

    /// Set the serial baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the registration retry budget and the delay between polls
    pub fn with_registration(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.registration_retries = retries;
        self.registration_retry_delay = retry_delay;
        self
    }

    /// Set the send timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Enable or disable logging of raw modem traffic
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the quiet period that ends a data read
    pub fn with_read_idle_timeout(mut self, timeout: Duration) -> Self {
        self.read_idle_timeout = timeout;
        self
    }

    /// Check that every option holds a usable value
    ///
    /// # Errors
    /// Returns `GsmError::InvalidConfig` naming the first offending option
    pub fn validate(&self) -> GsmResult<()> {
        if self.baud_rate == 0 {
            return Err(GsmError::InvalidConfig(
                "baud rate must be greater than zero".to_string(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(GsmError::InvalidConfig(
                "send timeout must be greater than zero".to_string(),
            ));
        }
        if self.read_idle_timeout.is_zero() {
            return Err(GsmError::InvalidConfig(
                "read idle timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
