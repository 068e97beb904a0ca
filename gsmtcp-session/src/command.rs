//! AT command session
//!
//! A `CommandSession` owns the byte link to the modem. The AT protocol is
//! strictly half-duplex: a command line goes out, then output is read until
//! one of a small set of expected replies shows up. The session therefore
//! hands out at most one `CommandGuard` at a time, and every exchange that
//! spans several waits (two-phase connect, send with raw payload) runs on a
//! single guard.
//!
//! Connection data arrives on the same link as command replies. Output read
//! while waiting for a reply lands in the reply buffer; output pulled by a
//! data read lands in the data buffer. Only the reply buffer is ever treated
//! as stale.

use crate::pattern::{Match, ResponsePattern};
use crate::statistics::SessionStatistics;
use bytes::{Buf, BytesMut};
use gsmtcp_core::{GsmError, GsmResult, SessionConfig};
use gsmtcp_transport::Link;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Terminator appended to every command line
pub const LINE_TERMINATOR: &str = "\r\n";

const READ_CHUNK: usize = 256;

struct SessionIo<L> {
    link: L,
    /// Output read while waiting for command replies
    replies: BytesMut,
    /// Connection data not yet handed to a reader; always older than
    /// anything in `replies`
    data: BytesMut,
    end_of_stream: bool,
    statistics: SessionStatistics,
}

/// AT command session over a modem link
///
/// # Why a Mutex?
/// The modem answers whatever command it saw last. Two interleaved
/// exchanges would read each other's replies, so the link sits behind an
/// async mutex and each exchange holds a `CommandGuard` from its first
/// command line to its last wait.
///
/// # Usage
/// Share the session as `Arc<CommandSession<L>>`. Single commands go through
/// [`CommandSession::execute`]; multi-step exchanges take a guard with
/// [`CommandSession::lock`] and run every step on it. Callers queue on the
/// mutex in arrival order.
pub struct CommandSession<L> {
    io: Mutex<SessionIo<L>>,
    config: SessionConfig,
}

impl<L: Link> CommandSession<L> {
    /// Create a session that takes exclusive ownership of `link`
    ///
    /// # Errors
    /// Returns `GsmError::InvalidConfig` if `config` does not validate
    pub fn new(link: L, config: SessionConfig) -> GsmResult<Self> {
        config.validate()?;
        Ok(Self {
            io: Mutex::new(SessionIo {
                link,
                replies: BytesMut::with_capacity(1024),
                data: BytesMut::new(),
                end_of_stream: false,
                statistics: SessionStatistics::new(),
            }),
            config,
        })
    }

    /// Configuration the session was created with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Wait for exclusive use of the link
    ///
    /// Callers queue here; the next command cannot start until the returned
    /// guard is dropped.
    pub async fn lock(&self) -> CommandGuard<'_, L> {
        CommandGuard {
            io: self.io.lock().await,
            verbose: self.config.verbose,
        }
    }

    /// Send `command` and wait up to `timeout` for one of `patterns`
    pub async fn execute(
        &self,
        command: &str,
        patterns: &[&ResponsePattern],
        timeout: Duration,
    ) -> GsmResult<Match> {
        self.lock().await.execute(command, patterns, timeout).await
    }

    /// Snapshot of the session counters
    pub async fn statistics(&self) -> SessionStatistics {
        self.io.lock().await.statistics.clone()
    }

    /// Shut the link down
    pub async fn close(&self) -> GsmResult<()> {
        let mut io = self.io.lock().await;
        io.replies.clear();
        io.data.clear();
        io.link.shutdown().await?;
        Ok(())
    }
}

/// Exclusive access to the modem link for the duration of one exchange
pub struct CommandGuard<'a, L> {
    io: MutexGuard<'a, SessionIo<L>>,
    verbose: bool,
}

impl<L: Link> CommandGuard<'_, L> {
    /// Send a command line
    ///
    /// Reply output left unread by earlier exchanges is discarded first, so a
    /// wait that follows only sees replies to this command. Connection data
    /// already pulled by a data read is kept.
    pub async fn send_line(&mut self, command: &str) -> GsmResult<()> {
        let stale = self.io.replies.len();
        if stale > 0 {
            log::trace!("discarding {} stale bytes before {}", stale, command);
            self.io.replies.clear();
            self.io.statistics.add_stale_bytes_discarded(stale);
        }

        if self.verbose {
            log::debug!("-> {}", command);
        }

        let mut line = Vec::with_capacity(command.len() + LINE_TERMINATOR.len());
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(LINE_TERMINATOR.as_bytes());
        self.io.link.write_all(&line).await?;
        self.io.link.flush().await?;
        self.io.statistics.increment_commands_sent();
        Ok(())
    }

    /// Wait up to `timeout` for one of `patterns` to appear in the output
    ///
    /// When several patterns are present, the one that starts earliest wins;
    /// ties go to the pattern listed first. The matched text and the line
    /// terminator right after it are consumed; anything later stays buffered.
    ///
    /// # Errors
    /// - `GsmError::TimedOut` if nothing matched in time
    /// - `GsmError::Transport` if the link fails or reaches end of stream
    pub async fn expect(
        &mut self,
        patterns: &[&ResponsePattern],
        timeout: Duration,
    ) -> GsmResult<Match> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = self.take_match(patterns) {
                self.io.statistics.increment_responses_matched();
                if self.verbose {
                    log::debug!("<- {}", found.text.trim());
                }
                return Ok(found);
            }

            let state = &mut *self.io;
            state.replies.reserve(READ_CHUNK);
            match tokio::time::timeout_at(deadline, state.link.read_buf(&mut state.replies)).await {
                Err(_) => {
                    state.statistics.increment_timeouts();
                    let waiting_for = patterns
                        .iter()
                        .map(|p| p.name())
                        .collect::<Vec<_>>()
                        .join("|");
                    return Err(GsmError::timed_out(waiting_for));
                }
                Ok(Err(e)) => return Err(GsmError::Transport(e)),
                Ok(Ok(0)) => {
                    state.end_of_stream = true;
                    return Err(GsmError::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "modem link closed while waiting for a response",
                    )));
                }
                Ok(Ok(_)) => {}
            }
        }
    }

    /// Send `command` and wait for one of `patterns`
    pub async fn execute(
        &mut self,
        command: &str,
        patterns: &[&ResponsePattern],
        timeout: Duration,
    ) -> GsmResult<Match> {
        self.send_line(command).await?;
        self.expect(patterns, timeout).await
    }

    /// Write payload bytes without a terminator
    pub async fn write_raw(&mut self, data: &[u8]) -> GsmResult<()> {
        self.io.link.write_all(data).await?;
        self.io.link.flush().await?;
        self.io.statistics.add_raw_bytes_written(data.len());
        Ok(())
    }

    /// Read one byte of data
    ///
    /// # Returns
    /// `None` once no byte has arrived for `idle`, or if the link reached end
    /// of stream. The modem has no other way of saying "no more data".
    pub async fn read_byte(&mut self, idle: Duration) -> GsmResult<Option<u8>> {
        if self.io.data.is_empty() && !self.fill_data(idle).await? {
            return Ok(None);
        }
        self.io.statistics.add_data_bytes_read(1);
        Ok(Some(self.io.data.get_u8()))
    }

    /// Read up to `max` data bytes, stopping early at end-of-data
    ///
    /// Bytes stay buffered in the session until the read completes, so
    /// dropping this future loses nothing.
    pub async fn read_data(&mut self, max: usize, idle: Duration) -> GsmResult<Vec<u8>> {
        while self.io.data.len() < max {
            if !self.fill_data(idle).await? {
                break;
            }
        }
        let n = max.min(self.io.data.len());
        self.io.statistics.add_data_bytes_read(n);
        Ok(self.io.data.split_to(n).to_vec())
    }

    /// Whether the link has reported end of stream
    pub fn at_end_of_stream(&self) -> bool {
        self.io.end_of_stream
    }

    /// Count a send the modem truncated
    pub fn record_partial_send(&mut self) {
        self.io.statistics.increment_partial_sends();
    }

    /// Move more connection data into the data buffer
    ///
    /// Output left behind in the reply buffer is newer than the data buffer
    /// and is promoted first; only then is the link read.
    ///
    /// # Returns
    /// `false` if nothing arrived within `idle` or the link is at end of
    /// stream
    async fn fill_data(&mut self, idle: Duration) -> GsmResult<bool> {
        let state = &mut *self.io;
        if !state.replies.is_empty() {
            let promoted = state.replies.split();
            state.data.extend_from_slice(&promoted);
            return Ok(true);
        }

        state.data.reserve(READ_CHUNK);
        match tokio::time::timeout(idle, state.link.read_buf(&mut state.data)).await {
            Err(_) => Ok(false),
            Ok(Ok(0)) => {
                state.end_of_stream = true;
                Ok(false)
            }
            Ok(Err(e)) => Err(GsmError::Transport(e)),
            Ok(Ok(_)) => Ok(true),
        }
    }

    fn take_match(&mut self, patterns: &[&ResponsePattern]) -> Option<Match> {
        let buffer = &self.io.replies;
        let (index, hit) = patterns
            .iter()
            .enumerate()
            .filter_map(|(index, pattern)| pattern.find_in(buffer).map(|hit| (index, hit)))
            .min_by_key(|(index, hit)| (hit.start, *index))?;

        let text = String::from_utf8_lossy(&buffer[hit.start..hit.end]).into_owned();
        let mut end = hit.end;
        while end < buffer.len() && matches!(buffer[end], b'\r' | b'\n') {
            end += 1;
        }
        self.io.replies.advance(end);
        Some(Match::new(index, text, hit.groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedModem;
    use crate::pattern::markers;
    use std::sync::Arc;

    fn session(link: tokio::io::DuplexStream) -> CommandSession<tokio::io::DuplexStream> {
        CommandSession::new(link, SessionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_execute_returns_matching_pattern() {
        let (link, modem) = ScriptedModem::new().on("AT", "AT\r\r\nERROR\r\n").spawn();
        let session = session(link);

        let m = session
            .execute("AT", &[&markers::OK, &markers::ERROR], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.text, "ERROR");
        assert_eq!(modem.lines(), vec!["AT"]);
    }

    #[tokio::test]
    async fn test_leftmost_match_wins() {
        let (link, _modem) = ScriptedModem::new()
            .on("AT+CIPSTART", "OK\r\n\r\nCONNECT OK\r\n")
            .spawn();
        let session = session(link);
        let mut guard = session.lock().await;

        let first = guard
            .execute(
                "AT+CIPSTART",
                &[&markers::CONNECT_OK, &markers::OK],
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(first.index, 1);

        let second = guard
            .expect(&[&markers::CONNECT_OK], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(second.text, "CONNECT OK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_names_patterns() {
        let (link, _modem) = ScriptedModem::new().on("AT", "").spawn();
        let session = session(link);

        let err = session
            .execute("AT", &[&markers::OK, &markers::ERROR], Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            GsmError::TimedOut { waiting_for } => assert_eq!(waiting_for, "OK|ERROR"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(session.statistics().await.timeouts, 1);
    }

    #[tokio::test]
    async fn test_end_of_stream_while_waiting_is_transport_error() {
        let (link, far_end) = tokio::io::duplex(64);
        drop(far_end);
        let session = session(link);
        let mut guard = session.lock().await;
        let err = guard
            .expect(&[&markers::OK], Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            GsmError::Transport(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_data_stops_at_end_of_data() {
        let (link, _modem) = ScriptedModem::new().emit("hello").spawn();
        let session = session(link);
        let mut guard = session.lock().await;

        let data = guard.read_data(16, Duration::from_millis(500)).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_read_data_keeps_bytes_after_match() {
        let (link, _modem) = ScriptedModem::new().on("AT+CIPSEND=3", "\r\nSEND OK\r\nabc").spawn();
        let session = session(link);
        let mut guard = session.lock().await;

        guard
            .execute("AT+CIPSEND=3", &[&markers::SEND_OK], Duration::from_secs(1))
            .await
            .unwrap();
        let data = guard.read_data(3, Duration::from_millis(500)).await.unwrap();
        assert_eq!(data, b"abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_keeps_unread_data() {
        let (link, _modem) = ScriptedModem::new()
            .emit("abcdefgh")
            .on("AT+CIPSTATUS", "\r\nOK\r\n")
            .spawn();
        let session = session(link);
        let mut guard = session.lock().await;
        let idle = Duration::from_millis(500);

        assert_eq!(guard.read_data(4, idle).await.unwrap(), b"abcd");
        guard
            .execute("AT+CIPSTATUS", &[&markers::OK], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(guard.read_data(16, idle).await.unwrap(), b"efgh");
        drop(guard);
        assert_eq!(session.statistics().await.stale_bytes_discarded, 0);
    }

    #[tokio::test]
    async fn test_read_data_reports_end_of_stream() {
        let (link, far_end) = tokio::io::duplex(64);
        drop(far_end);
        let session = session(link);
        let mut guard = session.lock().await;

        assert!(!guard.at_end_of_stream());
        let data = guard.read_data(8, Duration::from_millis(500)).await.unwrap();
        assert!(data.is_empty());
        assert!(guard.at_end_of_stream());
    }

    #[tokio::test]
    async fn test_one_command_in_flight() {
        let (link, modem) = ScriptedModem::new()
            .on("AT+ID=1", "\r\n+ID: one\r\n\r\nOK\r\n")
            .on("AT+ID=2", "\r\n+ID: two\r\n\r\nOK\r\n")
            .spawn();
        let session = Arc::new(session(link));
        let identity = Arc::new(ResponsePattern::regex("identity", r"\+ID: (\w+)").unwrap());

        let held = session.lock().await;
        let first = {
            let (session, identity) = (session.clone(), identity.clone());
            tokio::spawn(async move {
                session
                    .execute("AT+ID=1", &[&*identity], Duration::from_secs(1))
                    .await
            })
        };
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        let second = {
            let (session, identity) = (session.clone(), identity.clone());
            tokio::spawn(async move {
                session
                    .execute("AT+ID=2", &[&*identity], Duration::from_secs(1))
                    .await
            })
        };
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert!(!first.is_finished());
        assert!(!second.is_finished());
        assert!(modem.lines().is_empty());
        drop(held);

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.group(1), Some("one"));
        assert_eq!(second.group(1), Some("two"));
        assert_eq!(modem.lines(), vec!["AT+ID=1", "AT+ID=2"]);
        assert!(modem.errors().is_empty());
    }

    #[tokio::test]
    async fn test_new_command_discards_stale_output() {
        let (link, _modem) = ScriptedModem::new()
            .on("AT+CGREG?", "+CGREG: 0,1\r\n\r\nOK\r\n")
            .on("AT", "OK\r\n")
            .spawn();
        let session = session(link);
        let mut guard = session.lock().await;

        guard
            .execute("AT+CGREG?", &[&markers::REGISTRATION], Duration::from_secs(1))
            .await
            .unwrap();
        guard
            .execute("AT", &[&markers::OK], Duration::from_secs(1))
            .await
            .unwrap();
        drop(guard);
        let stats = session.statistics().await;
        assert_eq!(stats.commands_sent, 2);
        assert_eq!(stats.responses_matched, 2);
        assert_eq!(stats.stale_bytes_discarded, 4);
    }

    #[tokio::test]
    async fn test_write_raw_is_unterminated() {
        let (link, modem) = ScriptedModem::new().on_raw(4, "SEND OK\r\n").spawn();
        let session = session(link);
        let mut guard = session.lock().await;
        guard.write_raw(b"ping").await.unwrap();
        guard
            .expect(&[&markers::SEND_OK], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(modem.raw_payloads(), vec![b"ping".to_vec()]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (link, _far) = tokio::io::duplex(64);
        let config = SessionConfig::default().with_baud_rate(0);
        assert!(matches!(
            CommandSession::new(link, config),
            Err(GsmError::InvalidConfig(_))
        ));
    }
}
