//! Modem power state

use crate::command::CommandSession;
use crate::pattern::markers;
use gsmtcp_core::GsmResult;
use gsmtcp_transport::{Level, Link, PowerPin};
use std::sync::Arc;
use std::time::Duration;

/// Plain attention command; any powered modem answers `OK`
pub const STATUS_COMMAND: &str = "AT";
/// How long a powered modem may take to answer the status command
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
/// How long the power key must be held low to toggle the modem
pub const POWER_KEY_PULSE: Duration = Duration::from_secs(4);

/// Reads and toggles modem power
///
/// The controller owns the power key pin for as long as it lives.
pub struct PowerController<L, P> {
    session: Arc<CommandSession<L>>,
    pin: P,
}

impl<L: Link, P: PowerPin> PowerController<L, P> {
    pub fn new(session: Arc<CommandSession<L>>, pin: P) -> Self {
        Self { session, pin }
    }

    /// Check whether the modem is powered on
    ///
    /// A modem that stays silent is considered off.
    ///
    /// # Errors
    /// Link failures propagate; only a response timeout maps to `false`.
    pub async fn get_status(&self) -> GsmResult<bool> {
        match self
            .session
            .execute(STATUS_COMMAND, &[&markers::OK], STATUS_TIMEOUT)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_timeout() => Ok(false),
            Err(e) => {
                log::debug!("status check failed: {}", e);
                Err(e)
            }
        }
    }

    /// Pulse the power key: low, hold, high
    pub async fn toggle(&mut self) -> GsmResult<()> {
        log::debug!("toggling modem power key");
        self.pin.set_level(Level::Low).await?;
        tokio::time::sleep(POWER_KEY_PULSE).await;
        self.pin.set_level(Level::High).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedModem;
    use gsmtcp_core::{GsmError, SessionConfig};
    use gsmtcp_transport::MockPowerPin;
    use mockall::Sequence;
    use std::io;
    use tokio::time::Instant;

    fn controller(
        link: tokio::io::DuplexStream,
        pin: MockPowerPin,
    ) -> PowerController<tokio::io::DuplexStream, MockPowerPin> {
        let session = Arc::new(CommandSession::new(link, SessionConfig::default()).unwrap());
        PowerController::new(session, pin)
    }

    #[tokio::test]
    async fn test_status_on() {
        let (link, _modem) = ScriptedModem::new().on("AT", "AT\r\r\nOK\r\n").spawn();
        let controller = controller(link, MockPowerPin::new());
        assert!(controller.get_status().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_modem_is_off() {
        let (link, _modem) = ScriptedModem::new().on("AT", "").spawn();
        let controller = controller(link, MockPowerPin::new());
        assert!(!controller.get_status().await.unwrap());
    }

    #[tokio::test]
    async fn test_link_failure_propagates() {
        let (link, far_end) = tokio::io::duplex(64);
        drop(far_end);
        let controller = controller(link, MockPowerPin::new());
        assert!(matches!(
            controller.get_status().await,
            Err(GsmError::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_pulses_low_then_high() {
        let mut seq = Sequence::new();
        let mut pin = MockPowerPin::new();
        pin.expect_set_level()
            .withf(|level| *level == Level::Low)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        pin.expect_set_level()
            .withf(|level| *level == Level::High)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let (link, _far_end) = tokio::io::duplex(64);
        let mut controller = controller(link, pin);
        let started = Instant::now();
        controller.toggle().await.unwrap();
        assert!(started.elapsed() >= POWER_KEY_PULSE);
    }

    #[tokio::test]
    async fn test_toggle_propagates_gpio_failure() {
        let mut pin = MockPowerPin::new();
        pin.expect_set_level()
            .times(1)
            .returning(|_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "gpio busy")));

        let (link, _far_end) = tokio::io::duplex(64);
        let mut controller = controller(link, pin);
        match controller.toggle().await {
            Err(GsmError::Transport(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }
}
