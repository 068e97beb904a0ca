//! Modem lifecycle
//!
//! `Modem` owns one command session and everything built on it. Typical use:
//!
//! ```rust,no_run
//! use gsmtcp_client::Modem;
//! use gsmtcp_core::SessionConfig;
//! use gsmtcp_transport::SysfsPin;
//! use tokio::io::AsyncWriteExt;
//!
//! # async fn run() -> gsmtcp_core::GsmResult<()> {
//! let pin = SysfsPin::export(17).await?;
//! let mut modem = Modem::open_serial("/dev/ttyS0", pin, SessionConfig::default())?;
//! modem.init().await?;
//!
//! let mut stream = modem.connect("example.com:80").await?;
//! stream.write_all(b"GET / HTTP/1.0\r\n\r\n").await?;
//!
//! modem.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::address::RemoteAddress;
use crate::channel::TcpChannel;
use crate::stream::ModemStream;
use gsmtcp_core::{GsmError, GsmResult, SessionConfig};
use gsmtcp_session::{markers, CommandSession, NetworkRegistrar, PowerController, RegistrationStatus};
use gsmtcp_transport::{Link, PowerPin, SerialLink, SerialSettings};
use std::sync::Arc;
use std::time::Duration;

pub const ECHO_OFF_COMMAND: &str = "ATE0";
pub const ECHO_TIMEOUT: Duration = Duration::from_secs(3);
pub const GNSS_ON_COMMAND: &str = "AT+CGNSPWR=1";
pub const GNSS_OFF_COMMAND: &str = "AT+CGNSPWR=0";
pub const GNSS_TIMEOUT: Duration = Duration::from_secs(3);
/// Pause after closing the link so the port can be reopened
pub const SHUTDOWN_SETTLE: Duration = Duration::from_secs(1);

/// Cellular modem with a power key
pub struct Modem<L, P> {
    session: Arc<CommandSession<L>>,
    power: PowerController<L, P>,
    registrar: NetworkRegistrar<L>,
    channel: TcpChannel<L>,
}

impl<P: PowerPin> Modem<SerialLink, P> {
    /// Open the modem on a serial device at the configured baud rate
    ///
    /// # Arguments
    /// * `device` - Serial device path (e.g. "/dev/ttyS0")
    /// * `pin` - Power key pin
    /// * `config` - Session configuration
    pub fn open_serial(device: &str, pin: P, config: SessionConfig) -> GsmResult<Self> {
        config.validate()?;
        let link = SerialSettings::new(device, config.baud_rate).open()?;
        log::debug!("opened {} at {} baud", device, config.baud_rate);
        Self::new(link, pin, config)
    }
}

impl<L: Link, P: PowerPin> Modem<L, P> {
    pub fn new(link: L, pin: P, config: SessionConfig) -> GsmResult<Self> {
        let session = Arc::new(CommandSession::new(link, config)?);
        Ok(Self {
            power: PowerController::new(session.clone(), pin),
            registrar: NetworkRegistrar::new(session.clone()),
            channel: TcpChannel::new(session.clone()),
            session,
        })
    }

    pub fn session(&self) -> &Arc<CommandSession<L>> {
        &self.session
    }

    pub fn channel(&self) -> &TcpChannel<L> {
        &self.channel
    }

    pub fn registrar(&self) -> &NetworkRegistrar<L> {
        &self.registrar
    }

    /// Power the modem up if needed and wait until it is registered
    ///
    /// # Errors
    /// - `GsmError::NotReady` if the modem does not answer after power-on
    /// - registration errors from `NetworkRegistrar::wait`
    pub async fn init(&mut self) -> GsmResult<RegistrationStatus> {
        if self.power.get_status().await? {
            log::debug!("modem is powered on");
        } else {
            log::debug!("modem is off, toggling power");
            self.power.toggle().await?;
            if !self.power.get_status().await? {
                log::error!("modem did not answer after power-on");
                return Err(GsmError::NotReady("modem did not power on".to_string()));
            }
        }

        self.set_echo(false).await?;
        match self.registrar.wait().await {
            Ok(status) => Ok(status),
            Err(e) => {
                log::error!("network registration failed: {}", e);
                Err(e)
            }
        }
    }

    /// Power the modem down and release the link
    ///
    /// # Errors
    /// Returns `GsmError::NotReady` if the modem still answers after the
    /// power key was toggled
    pub async fn shutdown(&mut self) -> GsmResult<()> {
        log::debug!("toggling power to shut the modem down");
        self.power.toggle().await?;
        if self.power.get_status().await? {
            log::error!("modem still answers after power-off");
            return Err(GsmError::NotReady("modem did not power off".to_string()));
        }
        self.session.close().await?;
        tokio::time::sleep(SHUTDOWN_SETTLE).await;
        Ok(())
    }

    /// Open a TCP connection to `address` (`host:port`)
    pub async fn connect(&self, address: &str) -> GsmResult<ModemStream<L>> {
        let remote: RemoteAddress = address.parse()?;
        log::debug!("connecting to {}", remote);
        self.channel.open(&remote).await?;
        if !self.channel.is_connected().await? {
            return Err(GsmError::NotReady(format!("not connected to {}", remote)));
        }
        log::info!("connected to {}", remote);
        Ok(ModemStream::new(self.channel.clone(), remote))
    }

    /// Switch command echo on or off
    pub async fn set_echo(&self, enabled: bool) -> GsmResult<()> {
        let command = if enabled { "ATE1" } else { ECHO_OFF_COMMAND };
        self.expect_ok(command, ECHO_TIMEOUT).await
    }

    /// Switch the GNSS receiver on or off
    pub async fn set_gnss_power(&self, on: bool) -> GsmResult<()> {
        let command = if on { GNSS_ON_COMMAND } else { GNSS_OFF_COMMAND };
        self.expect_ok(command, GNSS_TIMEOUT).await
    }

    async fn expect_ok(&self, command: &str, timeout: Duration) -> GsmResult<()> {
        let reply = self
            .session
            .execute(command, &[&markers::OK, &markers::ERROR], timeout)
            .await?;
        match reply.index {
            0 => Ok(()),
            _ => Err(GsmError::Protocol(format!("{} rejected: {}", command, reply.text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsmtcp_session::mock::ScriptedModem;
    use gsmtcp_transport::{Level, MockPowerPin};
    use mockall::Sequence;
    use tokio::io::DuplexStream;

    fn pulse_once(pin: &mut MockPowerPin) {
        let mut seq = Sequence::new();
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
    }

    fn modem(link: DuplexStream, pin: MockPowerPin) -> Modem<DuplexStream, MockPowerPin> {
        Modem::new(link, pin, SessionConfig::default()).unwrap()
    }

    const OK: &str = "\r\nOK\r\n";
    const REGISTERED: &str = "\r\n+CGREG: 0,1\r\n\r\nOK\r\n";

    #[tokio::test(start_paused = true)]
    async fn test_init_powered_modem() {
        let (link, handle) = ScriptedModem::new()
            .on("AT", OK)
            .on(ECHO_OFF_COMMAND, OK)
            .on("AT+CGREG?", REGISTERED)
            .spawn();
        let mut modem = modem(link, MockPowerPin::new());

        assert_eq!(modem.init().await.unwrap(), RegistrationStatus::RegisteredHome);
        assert_eq!(handle.lines(), vec!["AT", "ATE0", "AT+CGREG?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_powers_on_silent_modem() {
        let mut pin = MockPowerPin::new();
        pulse_once(&mut pin);
        let (link, handle) = ScriptedModem::new()
            .on("AT", "")
            .on("AT", OK)
            .on(ECHO_OFF_COMMAND, OK)
            .on("AT+CGREG?", REGISTERED)
            .spawn();
        let mut modem = modem(link, pin);

        modem.init().await.unwrap();
        assert_eq!(handle.count("AT"), 4);
        assert!(handle.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_fails_when_modem_stays_off() {
        let mut pin = MockPowerPin::new();
        pulse_once(&mut pin);
        let (link, handle) = ScriptedModem::new().on("AT", "").on("AT", "").spawn();
        let mut modem = modem(link, pin);

        assert!(matches!(modem.init().await, Err(GsmError::NotReady(_))));
        assert_eq!(handle.count("ATE0"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() {
        let mut pin = MockPowerPin::new();
        pulse_once(&mut pin);
        let (link, _handle) = ScriptedModem::new().on("AT", "").spawn();
        let mut modem = modem(link, pin);
        modem.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_while_modem_answers() {
        let mut pin = MockPowerPin::new();
        pulse_once(&mut pin);
        let (link, _handle) = ScriptedModem::new().on("AT", OK).spawn();
        let mut modem = modem(link, pin);
        assert!(matches!(modem.shutdown().await, Err(GsmError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_connect_twice_closes_between() {
        let (link, handle) = ScriptedModem::new()
            .on("AT+CIPCLOSE", "\r\nERROR\r\n")
            .on("AT+CIPSTART", "\r\nOK\r\n\r\nCONNECT OK\r\n")
            .on("AT+CIPSTATUS", "\r\nOK\r\n\r\nSTATE: CONNECT OK\r\n")
            .on("AT+CIPCLOSE", "\r\nCLOSE OK\r\n")
            .on("AT+CIPSTART", "\r\nOK\r\n\r\nCONNECT OK\r\n")
            .on("AT+CIPSTATUS", "\r\nOK\r\n\r\nSTATE: CONNECT OK\r\n")
            .spawn();
        let modem = modem(link, MockPowerPin::new());

        let first = modem.connect("203.0.113.5:9000").await.unwrap();
        assert_eq!(first.peer().port(), 9000);
        let second = modem.connect("node.example.net:443").await.unwrap();
        assert_eq!(second.remote_addr(), None);

        let lines = handle.lines();
        assert_eq!(lines.len(), 6);
        assert!(lines[2].starts_with("AT+CIPSTATUS"));
        assert_eq!(lines[3], "AT+CIPCLOSE");
        assert_eq!(lines[4], "AT+CIPSTART=\"TCP\",\"node.example.net\",\"443\"");
        assert!(handle.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_not_confirmed() {
        let (link, _handle) = ScriptedModem::new()
            .on("AT+CIPCLOSE", "\r\nERROR\r\n")
            .on("AT+CIPSTART", "\r\nOK\r\n\r\nALREADY CONNECT\r\n")
            .on("AT+CIPSTATUS", "\r\nOK\r\n\r\nSTATE: TCP CLOSING\r\n")
            .spawn();
        let modem = modem(link, MockPowerPin::new());
        assert!(matches!(
            modem.connect("203.0.113.5:9000").await,
            Err(GsmError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_address() {
        let (link, handle) = ScriptedModem::new().spawn();
        let modem = modem(link, MockPowerPin::new());
        assert!(matches!(
            modem.connect("no-port").await,
            Err(GsmError::InvalidData(_))
        ));
        assert!(handle.lines().is_empty());
    }

    #[tokio::test]
    async fn test_gnss_power() {
        let (link, handle) = ScriptedModem::new()
            .on(GNSS_ON_COMMAND, OK)
            .on(GNSS_OFF_COMMAND, "\r\nERROR\r\n")
            .spawn();
        let modem = modem(link, MockPowerPin::new());

        modem.set_gnss_power(true).await.unwrap();
        assert!(matches!(
            modem.set_gnss_power(false).await,
            Err(GsmError::Protocol(_))
        ));
        assert_eq!(handle.lines(), vec![GNSS_ON_COMMAND, GNSS_OFF_COMMAND]);
    }
}
