//! JSON-RPC client for streams carried over a cellular modem
//!
//! The client speaks just enough HTTP/1.1 to post a JSON-RPC request and read
//! one response back. Responses are cut out of the byte stream by a
//! `ResponseFramer` that only understands the response shapes this client
//! expects; it is not a general HTTP implementation.
//!
//! Any `AsyncRead + AsyncWrite` stream works, so a TLS wrapper can sit between
//! the client and a `ModemStream`.

pub mod client;
pub mod error;
pub mod framer;
pub mod http;
pub mod message;

pub use client::RpcClient;
pub use error::{RpcError, RpcResult};
pub use framer::{Frame, FrameEnd, FrameShape, ResponseFramer, END_OF_CHUNKS};
pub use http::{parse_response, HttpResponse};
pub use message::{decode_response, encode_request, ClientRequest, ClientResponse};
