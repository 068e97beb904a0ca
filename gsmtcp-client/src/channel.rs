//! TCP connection driven through AT commands
//!
//! The modem keeps at most one TCP connection. Its state lives in the modem
//! and is queried on demand rather than mirrored here, so a `TcpChannel` is
//! only a handle onto the command session.

use crate::address::RemoteAddress;
use gsmtcp_core::{GsmError, GsmResult};
use gsmtcp_session::{markers, CommandGuard, CommandSession};
use gsmtcp_transport::Link;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Time allowed for each phase of a connect
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Time allowed for each phase of a status query
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);
pub const LOCAL_IP_TIMEOUT: Duration = Duration::from_secs(3);
/// Pause between arming a send and writing its payload
pub const SEND_ARM_DELAY: Duration = Duration::from_millis(10);

pub const CLOSE_COMMAND: &str = "AT+CIPCLOSE";
pub const STATUS_COMMAND: &str = "AT+CIPSTATUS";
pub const SEND_CAPACITY_COMMAND: &str = "AT+CIPSEND?";
pub const LOCAL_IP_COMMAND: &str = "AT+CIFSR";

const CONNECTED_STATE: &str = "CONNECT OK";

fn connect_command(address: &RemoteAddress) -> String {
    format!(
        "AT+CIPSTART=\"TCP\",\"{}\",\"{}\"",
        address.host(),
        address.port()
    )
}

fn send_command(len: usize) -> String {
    format!("AT+CIPSEND={}", len)
}

/// Handle on the modem's TCP connection
///
/// # Why No Local State?
/// The modem can drop the connection on its own (network loss, remote
/// close) without telling anyone. Any state cached here would go stale, so
/// every question is put to the modem.
///
/// # Usage
/// Clones share one command session. Every operation takes the session
/// lock for its whole exchange, so clones may be used from several tasks;
/// their exchanges run one after another.
pub struct TcpChannel<L> {
    session: Arc<CommandSession<L>>,
}

impl<L> Clone for TcpChannel<L> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<L: Link> TcpChannel<L> {
    pub fn new(session: Arc<CommandSession<L>>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<CommandSession<L>> {
        &self.session
    }

    /// Connect to `address`, closing any connection the modem still holds
    ///
    /// # Errors
    /// - `GsmError::Protocol` with the modem's reply if the connect is refused
    /// - `GsmError::AlreadyConnected` if the modem rejects the connect because
    ///   its previous connection could not be closed
    /// - `GsmError::TimedOut` if either phase gets no reply
    pub async fn open(&self, address: &RemoteAddress) -> GsmResult<()> {
        let mut guard = self.session.lock().await;
        if let Err(e) = Self::close_on(&mut guard).await {
            log::debug!("no previous connection closed: {}", e);
        }

        let accepted = guard
            .execute(
                &connect_command(address),
                &[&markers::OK, &markers::ERROR],
                CONNECT_TIMEOUT,
            )
            .await?;

        if accepted.index == 0 {
            let outcome = guard
                .expect(
                    &[
                        &markers::CONNECT_OK,
                        &markers::ALREADY_CONNECT,
                        &markers::STATE_TCP_CLOSED,
                    ],
                    CONNECT_TIMEOUT,
                )
                .await?;
            match outcome.index {
                0 | 1 => Ok(()),
                _ => Err(GsmError::Protocol(outcome.text)),
            }
        } else {
            let outcome = guard
                .expect(
                    &[
                        &markers::CONNECT_FAIL,
                        &markers::STATE_TCP_CLOSED,
                        &markers::ALREADY_CONNECT,
                    ],
                    CONNECT_TIMEOUT,
                )
                .await?;
            match outcome.index {
                2 => Err(GsmError::AlreadyConnected),
                _ => Err(GsmError::Protocol(outcome.text)),
            }
        }
    }

    /// Ask the modem whether its TCP connection is up
    ///
    /// A state other than `CONNECT OK`, or no state line at all, means not
    /// connected.
    pub async fn is_connected(&self) -> GsmResult<bool> {
        let mut guard = self.session.lock().await;
        let reply = guard
            .execute(
                STATUS_COMMAND,
                &[&markers::OK, &markers::ERROR],
                STATUS_TIMEOUT,
            )
            .await?;
        if reply.index != 0 {
            return Err(GsmError::Protocol(reply.text));
        }

        match guard
            .expect(&[&markers::CONNECTION_STATE], STATUS_TIMEOUT)
            .await
        {
            Ok(state) => Ok(state.group(1).map(str::trim) == Some(CONNECTED_STATE)),
            Err(e) if e.is_timeout() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Send as much of `data` as the modem accepts in one go
    ///
    /// The modem's per-send ceiling is queried before every send.
    ///
    /// # Returns
    /// The number of bytes written, which is `data.len()` on success
    ///
    /// # Errors
    /// - `GsmError::PartialSend` if the ceiling truncated the payload; the
    ///   first `written` bytes were delivered
    /// - `GsmError::NotReady` if the modem reports a ceiling of zero
    /// - `GsmError::Protocol` if the modem rejects the send
    pub async fn send(&self, data: &[u8]) -> GsmResult<usize> {
        self.send_before(data, None).await
    }

    /// Like [`TcpChannel::send`], giving up at `deadline` if the send has
    /// not been armed yet
    ///
    /// Once `AT+CIPSEND=<n>` is out the modem treats the next `n` bytes as
    /// payload, so from there on the exchange always runs to its
    /// acknowledgement, bounded only by the send timeout.
    ///
    /// # Errors
    /// As for `send`, plus `GsmError::TimedOut` if `deadline` passes while
    /// waiting for the session or for the capacity reply
    pub async fn send_before(&self, data: &[u8], deadline: Option<Instant>) -> GsmResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let send_timeout = self.session.config().send_timeout;

        let query = async {
            let mut guard = self.session.lock().await;
            let max_bytes = Self::query_capacity(&mut guard, send_timeout).await?;
            Ok::<_, GsmError>((guard, max_bytes))
        };
        let (mut guard, max_bytes) = match deadline {
            Some(at) => tokio::time::timeout_at(at, query)
                .await
                .map_err(|_| GsmError::timed_out("write deadline"))??,
            None => query.await?,
        };

        let written = data.len().min(max_bytes);
        guard.send_line(&send_command(written)).await?;
        tokio::time::sleep(SEND_ARM_DELAY).await;
        guard.write_raw(&data[..written]).await?;

        let ack = guard
            .expect(
                &[&markers::SEND_OK, &markers::SEND_FAIL, &markers::ERROR],
                send_timeout,
            )
            .await?;
        if ack.index != 0 {
            return Err(GsmError::Protocol(ack.text));
        }

        if written < data.len() {
            guard.record_partial_send();
            return Err(GsmError::PartialSend {
                written,
                requested: data.len(),
            });
        }
        Ok(written)
    }

    async fn query_capacity(guard: &mut CommandGuard<'_, L>, timeout: Duration) -> GsmResult<usize> {
        let capacity = guard
            .execute(
                SEND_CAPACITY_COMMAND,
                &[&markers::SEND_CAPACITY, &markers::ERROR],
                timeout,
            )
            .await?;
        if capacity.index != 0 {
            return Err(GsmError::Protocol(capacity.text));
        }
        let max_bytes = capacity
            .group(1)
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| GsmError::InvalidData(format!("bad send capacity {:?}", capacity.text)))?;
        if max_bytes == 0 {
            return Err(GsmError::NotReady(
                "modem reports no send capacity".to_string(),
            ));
        }
        Ok(max_bytes)
    }

    /// Close the modem's TCP connection
    pub async fn close(&self) -> GsmResult<()> {
        let mut guard = self.session.lock().await;
        Self::close_on(&mut guard).await
    }

    async fn close_on(guard: &mut CommandGuard<'_, L>) -> GsmResult<()> {
        let reply = guard
            .execute(
                CLOSE_COMMAND,
                &[&markers::CLOSE_OK, &markers::ERROR],
                CLOSE_TIMEOUT,
            )
            .await?;
        match reply.index {
            0 => Ok(()),
            _ => Err(GsmError::Protocol(reply.text)),
        }
    }

    /// Read up to `max` bytes of connection data
    ///
    /// Stops early once the modem has been quiet for the configured idle
    /// timeout; an empty result means no data.
    pub async fn read_data(&self, max: usize) -> GsmResult<Vec<u8>> {
        let idle = self.session.config().read_idle_timeout;
        self.session.lock().await.read_data(max, idle).await
    }

    /// Whether the modem link has reached end of stream
    pub async fn at_end_of_stream(&self) -> bool {
        self.session.lock().await.at_end_of_stream()
    }

    /// IP address the network assigned to the modem
    pub async fn local_ip_address(&self) -> GsmResult<String> {
        let reply = self
            .session
            .execute(
                LOCAL_IP_COMMAND,
                &[&markers::IP_ADDRESS, &markers::ERROR],
                LOCAL_IP_TIMEOUT,
            )
            .await?;
        if reply.index != 0 {
            return Err(GsmError::Protocol(reply.text));
        }
        reply
            .group(1)
            .map(str::to_string)
            .ok_or_else(|| GsmError::InvalidData(reply.text.clone()))
    }
}
