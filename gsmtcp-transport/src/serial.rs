//! Serial port link

use gsmtcp_core::{GsmError, GsmResult};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_serial::SerialStream;

/// Serial port settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
}

impl SerialSettings {
    /// Create serial settings for 8N1 without flow control
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
        }
    }

    /// Enable hardware (RTS/CTS) flow control
    pub fn with_hardware_flow_control(mut self) -> Self {
        self.flow_control = tokio_serial::FlowControl::Hardware;
        self
    }

    /// Open the serial port
    ///
    /// # Errors
    /// Returns `GsmError::Transport` if the device cannot be opened
    pub fn open(&self) -> GsmResult<SerialLink> {
        let builder = tokio_serial::new(&self.port_name, self.baud_rate)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits)
            .parity(self.parity)
            .flow_control(self.flow_control);

        let stream = SerialStream::open(&builder).map_err(|e| {
            GsmError::Transport(io::Error::other(format!(
                "Failed to open serial port {}: {}",
                self.port_name, e
            )))
        })?;

        Ok(SerialLink {
            stream,
            port_name: self.port_name.clone(),
        })
    }
}

/// An open serial port
pub struct SerialLink {
    stream: SerialStream,
    port_name: String,
}

impl SerialLink {
    /// Name of the device this link was opened on
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink")
            .field("port_name", &self.port_name)
            .finish()
    }
}

impl AsyncRead for SerialLink {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for SerialLink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
