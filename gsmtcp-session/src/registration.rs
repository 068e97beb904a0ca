//! Network registration

use crate::command::CommandSession;
use crate::pattern::markers;
use gsmtcp_core::{GsmError, GsmResult};
use gsmtcp_transport::Link;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Packet-domain registration query
pub const REGISTRATION_COMMAND: &str = "AT+CGREG?";
/// Pause between the query and reading its reply
pub const REGISTRATION_SETTLE: Duration = Duration::from_millis(100);
/// How long to wait for the `+CGREG` reply
pub const REGISTRATION_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Registration status reported in `+CGREG: <n>,<stat>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    NotRegistered,
    RegisteredHome,
    Trying,
    Denied,
    Unknown,
    RegisteredRoaming,
}

impl RegistrationStatus {
    /// Map a `<stat>` code; codes outside 0..=5 are not recognised
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RegistrationStatus::NotRegistered),
            1 => Some(RegistrationStatus::RegisteredHome),
            2 => Some(RegistrationStatus::Trying),
            3 => Some(RegistrationStatus::Denied),
            4 => Some(RegistrationStatus::Unknown),
            5 => Some(RegistrationStatus::RegisteredRoaming),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            RegistrationStatus::NotRegistered => 0,
            RegistrationStatus::RegisteredHome => 1,
            RegistrationStatus::Trying => 2,
            RegistrationStatus::Denied => 3,
            RegistrationStatus::Unknown => 4,
            RegistrationStatus::RegisteredRoaming => 5,
        }
    }

    /// Attached to the network, at home or roaming
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::RegisteredHome | RegistrationStatus::RegisteredRoaming
        )
    }

    /// Not attached yet, worth polling again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::NotRegistered | RegistrationStatus::Trying
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::NotRegistered => "not registered",
            RegistrationStatus::RegisteredHome => "registered (home)",
            RegistrationStatus::Trying => "trying to register",
            RegistrationStatus::Denied => "registration denied",
            RegistrationStatus::Unknown => "unknown registration error",
            RegistrationStatus::RegisteredRoaming => "registered (roaming)",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// Polls the modem until it is attached to the network
pub struct NetworkRegistrar<L> {
    session: Arc<CommandSession<L>>,
}

impl<L: Link> NetworkRegistrar<L> {
    pub fn new(session: Arc<CommandSession<L>>) -> Self {
        Self { session }
    }

    /// Query the current registration status once
    ///
    /// # Errors
    /// - `GsmError::TimedOut` if no `+CGREG` reply arrives
    /// - `GsmError::InvalidData` if the status code is not recognised
    pub async fn poll_status(&self) -> GsmResult<RegistrationStatus> {
        let mut guard = self.session.lock().await;
        guard.send_line(REGISTRATION_COMMAND).await?;
        tokio::time::sleep(REGISTRATION_SETTLE).await;
        let reply = guard
            .expect(&[&markers::REGISTRATION], REGISTRATION_REPLY_TIMEOUT)
            .await?;

        reply
            .group(1)
            .and_then(|code| code.parse::<u8>().ok())
            .and_then(RegistrationStatus::from_code)
            .ok_or_else(|| {
                GsmError::InvalidData(format!(
                    "unknown registration status in {:?}",
                    reply.text.trim()
                ))
            })
    }

    /// Wait for registration using the session's configured retry budget
    pub async fn wait(&self) -> GsmResult<RegistrationStatus> {
        let config = self.session.config();
        self.wait_for_registration(config.registration_retries, config.registration_retry_delay)
            .await
    }

    /// Poll until registered, denied, or out of retries
    ///
    /// Transient statuses are retried up to `max_retries` times with
    /// `retry_delay` between polls. Denied and unknown-error statuses fail
    /// at once.
    ///
    /// # Returns
    /// The registered status (home or roaming)
    pub async fn wait_for_registration(
        &self,
        max_retries: u32,
        retry_delay: Duration,
    ) -> GsmResult<RegistrationStatus> {
        let mut retries = 0;
        loop {
            let status = self.poll_status().await?;
            if status.is_registered() {
                log::info!("network registration complete: {}", status);
                return Ok(status);
            }
            if !status.is_transient() {
                return Err(GsmError::RegistrationFailed(status.to_string()));
            }
            if retries == max_retries {
                return Err(GsmError::MaxRetriesExceeded {
                    retries: max_retries,
                });
            }
            log::warn!(
                "{}, retrying in {:?} ({}/{})",
                status,
                retry_delay,
                retries + 1,
                max_retries
            );
            tokio::time::sleep(retry_delay).await;
            retries += 1;
        }
    }
}
