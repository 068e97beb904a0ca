//! Byte stream over the modem's TCP connection
//!
//! `ModemStream` lets code written against `tokio::io` traits (HTTP clients,
//! TLS wrappers) run over a modem connection. Each poll drives a boxed
//! channel operation to completion; the channel serialises them on the
//! command session.

use crate::address::{parse_dotted_quad, RemoteAddress};
use crate::channel::TcpChannel;
use bytes::BytesMut;
use futures::future::BoxFuture;
use gsmtcp_core::{GsmError, GsmResult};
use gsmtcp_transport::Link;
use std::future::Future;
use std::io;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

/// Absolute deadlines applied to stream operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadlines {
    pub read: Option<Instant>,
    pub write: Option<Instant>,
    /// Applies to both reads and writes
    pub total: Option<Instant>,
}

impl Deadlines {
    /// Effective cutoff for reads
    pub fn read_cutoff(&self) -> Option<Instant> {
        earliest(self.read, self.total)
    }

    /// Effective cutoff for writes
    pub fn write_cutoff(&self) -> Option<Instant> {
        earliest(self.write, self.total)
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn check_future(at: Instant) -> GsmResult<Instant> {
    if at <= Instant::now() {
        return Err(GsmError::InvalidData(
            "deadline is not in the future".to_string(),
        ));
    }
    Ok(at)
}

async fn with_deadline<T>(
    deadline: Option<Instant>,
    operation: &'static str,
    op: impl Future<Output = GsmResult<T>>,
) -> GsmResult<T> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, op)
            .await
            .map_err(|_| GsmError::timed_out(format!("{} deadline", operation)))?,
        None => op.await,
    }
}

/// Read at least one byte, or nothing once the link has ended
///
/// A quiet spell before the first byte is not end of data; only the
/// caller's deadline bounds the wait.
async fn read_some<L: Link>(channel: &TcpChannel<L>, max: usize) -> GsmResult<Vec<u8>> {
    loop {
        let data = channel.read_data(max).await?;
        if !data.is_empty() || channel.at_end_of_stream().await {
            return Ok(data);
        }
        log::trace!("no connection data yet, waiting on");
    }
}

/// Write all of `data`, re-sending whatever the modem's ceiling cut off
///
/// Each pass delivers at least one byte or fails, so the loop runs at most
/// `data.len()` times. The deadline is checked between sends; a send the
/// modem has been armed for always runs to its acknowledgement.
///
/// # Returns
/// The number of bytes delivered, and the error that stopped the loop early
async fn send_all<L: Link>(
    channel: &TcpChannel<L>,
    data: &[u8],
    deadline: Option<Instant>,
) -> (usize, Option<GsmError>) {
    let mut offset = 0;
    while offset < data.len() {
        if deadline.is_some_and(|at| Instant::now() >= at) {
            return (offset, Some(GsmError::timed_out("write deadline")));
        }
        match channel.send_before(&data[offset..], deadline).await {
            Ok(0) | Err(GsmError::PartialSend { written: 0, .. }) => {
                let stalled = GsmError::PartialSend {
                    written: offset,
                    requested: data.len(),
                };
                return (offset, Some(stalled));
            }
            Ok(n) => offset += n,
            Err(GsmError::PartialSend { written, .. }) => {
                log::debug!(
                    "modem accepted {} of {} remaining bytes",
                    written,
                    data.len() - offset
                );
                offset += written;
            }
            Err(e) => return (offset, Some(e)),
        }
    }
    (offset, None)
}

/// `AsyncRead` + `AsyncWrite` view of a modem TCP connection
///
/// # Why Boxed Futures?
/// Every read and write is an AT exchange that spans several awaits on the
/// command session. `poll_read` and `poll_write` keep the exchange they
/// started and drive it across polls, so a caller that polls again continues
/// the same exchange instead of starting a new one.
///
/// # Reads
/// A read returns as soon as some data has arrived and the modem has gone
/// quiet, or the caller's buffer is full. Zero bytes means the modem link
/// itself has ended.
///
/// # Writes
/// A write loops over the modem's per-send ceiling. If a later chunk fails
/// after earlier ones went out, the write reports the bytes already sent and
/// the next write returns the error.
///
/// # Deadlines
/// Reads use the earlier of the read and total deadlines, writes the earlier
/// of the write and total deadlines. An expired deadline fails the operation
/// with `io::ErrorKind::TimedOut`.
pub struct ModemStream<L> {
    channel: TcpChannel<L>,
    remote: RemoteAddress,
    deadlines: Deadlines,
    /// Bytes read from the modem that did not fit the caller's buffer
    pending: BytesMut,
    /// Failure held back from a write that already reported progress
    write_error: Option<GsmError>,
    read_fut: Option<BoxFuture<'static, GsmResult<Vec<u8>>>>,
    write_fut: Option<BoxFuture<'static, (usize, Option<GsmError>)>>,
    close_fut: Option<BoxFuture<'static, GsmResult<()>>>,
}

impl<L: Link> ModemStream<L> {
    pub fn new(channel: TcpChannel<L>, remote: RemoteAddress) -> Self {
        Self {
            channel,
            remote,
            deadlines: Deadlines::default(),
            pending: BytesMut::new(),
            write_error: None,
            read_fut: None,
            write_fut: None,
            close_fut: None,
        }
    }

    pub fn channel(&self) -> &TcpChannel<L> {
        &self.channel
    }

    /// Endpoint this stream was connected to
    pub fn peer(&self) -> &RemoteAddress {
        &self.remote
    }

    /// Remote host as an IPv4 address; `None` for host names
    pub fn remote_addr(&self) -> Option<Ipv4Addr> {
        self.remote.ip()
    }

    /// Address the network assigned to the modem
    ///
    /// Queries the modem; any failure yields `None`.
    pub async fn local_addr(&self) -> Option<Ipv4Addr> {
        match self.channel.local_ip_address().await {
            Ok(ip) => parse_dotted_quad(&ip),
            Err(e) => {
                log::debug!("local address unavailable: {}", e);
                None
            }
        }
    }

    pub fn deadlines(&self) -> Deadlines {
        self.deadlines
    }

    /// Set the deadline shared by reads and writes
    ///
    /// # Errors
    /// Returns `GsmError::InvalidData` if `at` is not in the future
    pub fn set_deadline(&mut self, at: Instant) -> GsmResult<()> {
        self.deadlines.total = Some(check_future(at)?);
        Ok(())
    }

    pub fn set_read_deadline(&mut self, at: Instant) -> GsmResult<()> {
        self.deadlines.read = Some(check_future(at)?);
        Ok(())
    }

    pub fn set_write_deadline(&mut self, at: Instant) -> GsmResult<()> {
        self.deadlines.write = Some(check_future(at)?);
        Ok(())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadlines.total
    }

    pub fn read_deadline(&self) -> Option<Instant> {
        self.deadlines.read
    }

    pub fn write_deadline(&self) -> Option<Instant> {
        self.deadlines.write
    }

    pub fn clear_deadlines(&mut self) {
        self.deadlines = Deadlines::default();
    }

    /// Close the modem connection
    pub async fn close(&mut self) -> GsmResult<()> {
        self.read_fut = None;
        self.write_fut = None;
        self.channel.close().await
    }

    fn start_read(&self, max: usize) -> BoxFuture<'static, GsmResult<Vec<u8>>> {
        let channel = self.channel.clone();
        let deadline = self.deadlines.read_cutoff();
        Box::pin(async move { with_deadline(deadline, "read", read_some(&channel, max)).await })
    }

    fn start_write(&self, data: Vec<u8>) -> BoxFuture<'static, (usize, Option<GsmError>)> {
        let channel = self.channel.clone();
        let deadline = self.deadlines.write_cutoff();
        Box::pin(async move { send_all(&channel, &data, deadline).await })
    }

    fn start_close(&self) -> BoxFuture<'static, GsmResult<()>> {
        let channel = self.channel.clone();
        Box::pin(async move { channel.close().await })
    }
}

impl<L: Link> AsyncRead for ModemStream<L> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.pending.is_empty() {
            let n = this.pending.len().min(buf.remaining());
            buf.put_slice(&this.pending.split_to(n));
            return Poll::Ready(Ok(()));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let mut fut = match this.read_fut.take() {
            Some(fut) => fut,
            None => this.start_read(buf.remaining()),
        };
        let result = match fut.as_mut().poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => {
                this.read_fut = Some(fut);
                return Poll::Pending;
            }
        };

        let data = result.map_err(io::Error::from)?;
        let n = data.len().min(buf.remaining());
        buf.put_slice(&data[..n]);
        this.pending.extend_from_slice(&data[n..]);
        Poll::Ready(Ok(()))
    }
}

impl<L: Link> AsyncWrite for ModemStream<L> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Some(e) = this.write_error.take() {
            return Poll::Ready(Err(e.into()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let mut fut = match this.write_fut.take() {
            Some(fut) => fut,
            None => this.start_write(buf.to_vec()),
        };
        let (written, error) = match fut.as_mut().poll(cx) {
            Poll::Ready(outcome) => outcome,
            Poll::Pending => {
                this.write_fut = Some(fut);
                return Poll::Pending;
            }
        };

        match error {
            Some(e) if written == 0 => Poll::Ready(Err(e.into())),
            Some(e) => {
                log::debug!("write stopped after {} bytes: {}", written, e);
                this.write_error = Some(e);
                Poll::Ready(Ok(written))
            }
            None => Poll::Ready(Ok(written)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Every write completes only after the modem acknowledged it.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut fut = match this.close_fut.take() {
            Some(fut) => fut,
            None => this.start_close(),
        };
        match fut.as_mut().poll(cx) {
            Poll::Ready(result) => Poll::Ready(result.map_err(io::Error::from)),
            Poll::Pending => {
                this.close_fut = Some(fut);
                Poll::Pending
            }
        }
    }
}
