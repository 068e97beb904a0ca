//! Response framing
//!
//! The modem stream has no notion of message boundaries and the server may
//! keep the connection open, so reading to end of stream would stall until
//! the modem's idle timeout. `ResponseFramer` instead watches the bytes as
//! they arrive and stops as soon as a response is complete.
//!
//! Only two terminal conditions are recognised:
//!
//! - the accumulated bytes end with the end-of-chunks marker `\r\n0\r\n\r\n`
//! - the head declares a `Content-Length` and that many body bytes arrived
//!
//! This is enough for the JSON-RPC responses the client expects and nothing
//! more. A `FrameShape` states what the response must look like; anything
//! else fails with `RpcError::UnexpectedShape` instead of being mis-framed.

use crate::error::{RpcError, RpcResult};
use crate::http::parse_head;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Marker closing a chunked body: CRLF, zero-size chunk, CRLF, CRLF
pub const END_OF_CHUNKS: &[u8; 7] = b"\r\n0\r\n\r\n";
/// Default cap on accumulated response bytes
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024;

const READ_CHUNK: usize = 1024;

/// Precondition on the response being framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    /// Only this `Content-Length` is accepted, when set
    pub expected_content_length: Option<usize>,
    /// Give up once this many bytes accumulated without a boundary
    pub max_frame: usize,
}

impl Default for FrameShape {
    fn default() -> Self {
        Self {
            expected_content_length: None,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

impl FrameShape {
    pub fn with_expected_content_length(mut self, len: usize) -> Self {
        self.expected_content_length = Some(len);
        self
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }
}

/// Why a frame ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    EndOfChunks,
    ContentLength,
    EndOfStream,
}

/// One framed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Response bytes; for `EndOfChunks` the marker itself is not included
    pub bytes: Vec<u8>,
    pub end: FrameEnd,
}

/// Cuts one HTTP response out of a byte stream
#[derive(Debug, Clone, Default)]
pub struct ResponseFramer {
    shape: FrameShape,
}

impl ResponseFramer {
    pub fn new(shape: FrameShape) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> &FrameShape {
        &self.shape
    }

    /// Decide whether `accumulated` holds a complete response
    ///
    /// # Returns
    /// The frame length and how the frame ended, or `None` if more bytes are
    /// needed
    ///
    /// # Errors
    /// - `RpcError::UnexpectedShape` if the declared length differs from the
    ///   expected one
    /// - `RpcError::FrameTooLarge` if the declared body exceeds the size cap
    /// - `RpcError::Http` if the head is malformed
    pub fn boundary(&self, accumulated: &[u8]) -> RpcResult<Option<(usize, FrameEnd)>> {
        if accumulated.ends_with(END_OF_CHUNKS) {
            return Ok(Some((
                accumulated.len() - END_OF_CHUNKS.len(),
                FrameEnd::EndOfChunks,
            )));
        }

        let Some(head) = parse_head(accumulated)? else {
            return Ok(None);
        };
        let Some(declared) = head.content_length()? else {
            return Ok(None);
        };
        match self.shape.expected_content_length {
            Some(expected) if declared != expected => {
                return Err(RpcError::UnexpectedShape(format!(
                    "Content-Length {} where {} was expected",
                    declared, expected
                )));
            }
            _ => {}
        }

        let too_large = RpcError::FrameTooLarge {
            limit: self.shape.max_frame,
        };
        if declared > self.shape.max_frame {
            return Err(too_large);
        }
        let end = head.len.checked_add(declared).ok_or(too_large)?;
        if accumulated.len() >= end {
            Ok(Some((end, FrameEnd::ContentLength)))
        } else {
            Ok(None)
        }
    }

    /// Read one response from `reader`
    ///
    /// Bytes past the frame boundary that arrived in the same read are
    /// dropped.
    ///
    /// # Errors
    /// - `RpcError::FrameTooLarge` once the shape's size cap is exceeded
    /// - `RpcError::Io` if the stream ends before any byte arrived
    pub async fn read_frame<R>(&self, reader: &mut R) -> RpcResult<Frame>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = BytesMut::with_capacity(READ_CHUNK);
        loop {
            buffer.reserve(READ_CHUNK);
            let n = reader.read_buf(&mut buffer).await?;
            if n == 0 {
                if buffer.is_empty() {
                    return Err(RpcError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "stream closed before a response arrived",
                    )));
                }
                log::debug!("response ended with the stream after {} bytes", buffer.len());
                return Ok(Frame {
                    bytes: buffer.to_vec(),
                    end: FrameEnd::EndOfStream,
                });
            }

            if let Some((len, end)) = self.boundary(&buffer)? {
                buffer.truncate(len);
                return Ok(Frame {
                    bytes: buffer.to_vec(),
                    end,
                });
            }
            if buffer.len() > self.shape.max_frame {
                return Err(RpcError::FrameTooLarge {
                    limit: self.shape.max_frame,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsmtcp_core::GsmError;
    use tokio_test::io::Builder;

    const CHUNKED_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";

    #[tokio::test]
    async fn test_frame_excludes_end_of_chunks_marker() {
        let mut reader = Builder::new()
            .read(CHUNKED_HEAD)
            .read(b"c\r\n{\"result\":1}")
            .read(END_OF_CHUNKS)
            .build();

        let frame = ResponseFramer::default().read_frame(&mut reader).await.unwrap();
        let mut expected = CHUNKED_HEAD.to_vec();
        expected.extend_from_slice(b"c\r\n{\"result\":1}");
        assert_eq!(frame.bytes, expected);
        assert_eq!(frame.end, FrameEnd::EndOfChunks);
    }

    #[tokio::test]
    async fn test_marker_inside_last_segment() {
        let mut reader = Builder::new()
            .read(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nok\r\n0\r\n\r\n")
            .build();
        let frame = ResponseFramer::default().read_frame(&mut reader).await.unwrap();
        assert!(frame.bytes.ends_with(b"2\r\nok"));
        assert_eq!(frame.end, FrameEnd::EndOfChunks);
    }

    #[tokio::test]
    async fn test_content_length_frame() {
        let body = br#"{"jsonrpc":"2.0","result":true,"id":"a"}"#;
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
        let mut reader = Builder::new()
            .read(&head.as_bytes()[..10])
            .read(&head.as_bytes()[10..])
            .read(&body[..7])
            .read(&body[7..])
            .build();

        let framer = ResponseFramer::new(FrameShape::default().with_expected_content_length(body.len()));
        let frame = framer.read_frame(&mut reader).await.unwrap();
        assert_eq!(frame.end, FrameEnd::ContentLength);
        assert!(frame.bytes.ends_with(body));
        assert_eq!(frame.bytes.len(), head.len() + body.len());
    }

    #[tokio::test]
    async fn test_unexpected_content_length_is_rejected() {
        let mut reader = Builder::new()
            .read(b"HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\n")
            .build();
        let framer = ResponseFramer::new(FrameShape::default().with_expected_content_length(78));
        assert!(matches!(
            framer.read_frame(&mut reader).await,
            Err(RpcError::UnexpectedShape(_))
        ));
    }

    #[tokio::test]
    async fn test_end_of_stream_ends_frame() {
        let mut reader = Builder::new()
            .read(b"HTTP/1.0 200 OK\r\n\r\n")
            .read(b"partial body")
            .build();
        let frame = ResponseFramer::default().read_frame(&mut reader).await.unwrap();
        assert_eq!(frame.end, FrameEnd::EndOfStream);
        assert!(frame.bytes.ends_with(b"partial body"));
    }

    #[tokio::test]
    async fn test_empty_stream_is_an_error() {
        let mut reader = Builder::new().build();
        assert!(matches!(
            ResponseFramer::default().read_frame(&mut reader).await,
            Err(RpcError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_size_cap() {
        let mut reader = Builder::new()
            .read(CHUNKED_HEAD)
            .read(&[b'x'; 200])
            .build();
        let framer = ResponseFramer::new(FrameShape::default().with_max_frame(128));
        assert!(matches!(
            framer.read_frame(&mut reader).await,
            Err(RpcError::FrameTooLarge { limit: 128 })
        ));
    }

    #[test]
    fn test_huge_content_length_is_rejected() {
        let framer = ResponseFramer::default();
        assert!(matches!(
            framer.boundary(b"HTTP/1.1 200 OK\r\nContent-Length: 18446744073709551615\r\n\r\n"),
            Err(RpcError::FrameTooLarge { limit: DEFAULT_MAX_FRAME })
        ));
        assert!(matches!(
            framer.boundary(b"HTTP/1.1 200 OK\r\nContent-Length: 65537\r\n\r\n"),
            Err(RpcError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_modem_error_surfaces_as_gsm() {
        let mut reader = Builder::new()
            .read_error(GsmError::timed_out("read deadline").into())
            .build();
        assert!(matches!(
            ResponseFramer::default().read_frame(&mut reader).await,
            Err(RpcError::Gsm(GsmError::TimedOut { .. }))
        ));
    }

    #[test]
    fn test_boundary_needs_complete_head() {
        let framer = ResponseFramer::default();
        assert_eq!(framer.boundary(b"HTTP/1.1 200 OK\r\nContent-Le").unwrap(), None);
        assert_eq!(
            framer.boundary(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").unwrap(),
            Some((40, FrameEnd::ContentLength))
        );
    }
}
