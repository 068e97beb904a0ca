//! JSON-RPC over HTTP client

use crate::error::{RpcError, RpcResult};
use crate::framer::{FrameShape, ResponseFramer};
use crate::http::parse_response;
use crate::message::{decode_response, encode_request};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_PATH: &str = "/";

/// Build a `POST` carrying a JSON body
pub fn build_request(host: &str, path: &str, body: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "POST {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Content-Type: application/json\r\n\
         Accept: application/json\r\n\
         Content-Length: {}\r\n\
         Accept-Encoding: identity\r\n\
         \r\n",
        path,
        host,
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);
    request
}

/// JSON-RPC client over an established byte stream
///
/// Calls are strictly sequential: each one writes a request and reads its
/// response before returning.
pub struct RpcClient<S> {
    stream: S,
    host: String,
    path: String,
    framer: ResponseFramer,
}

impl<S: AsyncRead + AsyncWrite + Unpin> RpcClient<S> {
    /// Create a client posting to `/` on `host`
    pub fn new(stream: S, host: impl Into<String>) -> Self {
        Self {
            stream,
            host: host.into(),
            path: DEFAULT_PATH.to_string(),
            framer: ResponseFramer::default(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_frame_shape(mut self, shape: FrameShape) -> Self {
        self.framer = ResponseFramer::new(shape);
        self
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Call `method` with a single parameter and decode the result
    ///
    /// # Errors
    /// - `RpcError::HttpStatus` for a non-2xx response
    /// - `RpcError::Remote` / `RpcError::NullResult` for JSON-RPC failures
    /// - framing, parsing and I/O errors as they occur
    pub async fn call<P, R>(&mut self, method: &str, param: P) -> RpcResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let body = encode_request(method, param)?;
        let request = build_request(&self.host, &self.path, &body);
        log::debug!("calling {} ({} byte request)", method, request.len());

        self.stream.write_all(&request).await?;
        self.stream.flush().await?;

        let frame = self.framer.read_frame(&mut self.stream).await?;
        let response = parse_response(&frame.bytes)?;
        log::debug!(
            "{} answered {} with {} body bytes ({:?})",
            method,
            response.status,
            response.body.len(),
            frame.end
        );
        if !response.is_success() {
            return Err(RpcError::HttpStatus {
                status: response.status,
                reason: response.reason,
            });
        }
        decode_response(&response.body)
    }
}
