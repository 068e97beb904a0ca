//! HTTP/1.1 response parsing
//!
//! Covers the responses a JSON-RPC endpoint sends: a status line, headers and
//! a body that is either chunked or sized by `Content-Length`.

use crate::error::{RpcError, RpcResult};

const MAX_HEADERS: usize = 64;

/// Parsed response head
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Head {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    /// Length of the head including the blank line
    pub len: usize,
}

impl Head {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_length(&self) -> RpcResult<Option<usize>> {
        self.header("Content-Length")
            .map(|value| {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| RpcError::Http(format!("invalid Content-Length {:?}", value)))
            })
            .transpose()
    }

    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse the response head if all of it has arrived
pub(crate) fn parse_head(bytes: &[u8]) -> RpcResult<Option<Head>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    let len = match response.parse(bytes) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(RpcError::Http(e.to_string())),
    };

    let status = response
        .code
        .ok_or_else(|| RpcError::Http("missing status code".to_string()))?;
    let reason = response.reason.unwrap_or_default().to_string();
    let headers = response
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    Ok(Some(Head {
        status,
        reason,
        headers,
        len,
    }))
}

/// A complete HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Parse a framed response
///
/// A chunked body may stop right after its last data chunk: the framer cuts
/// the terminating zero-size chunk off.
///
/// # Errors
/// Returns `RpcError::Http` if the head is incomplete or malformed, or the
/// body is shorter than declared
pub fn parse_response(frame: &[u8]) -> RpcResult<HttpResponse> {
    let head = parse_head(frame)?
        .ok_or_else(|| RpcError::Http("incomplete response head".to_string()))?;
    let rest = &frame[head.len..];

    let body = if head.is_chunked() {
        decode_chunked(rest)?
    } else if let Some(len) = head.content_length()? {
        if rest.len() < len {
            return Err(RpcError::Http(format!(
                "body has {} of {} declared bytes",
                rest.len(),
                len
            )));
        }
        rest[..len].to_vec()
    } else {
        rest.to_vec()
    };

    Ok(HttpResponse {
        status: head.status,
        reason: head.reason,
        headers: head.headers,
        body,
    })
}

fn decode_chunked(mut data: &[u8]) -> RpcResult<Vec<u8>> {
    let mut body = Vec::new();
    while !data.is_empty() {
        let line_end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| RpcError::Http("unterminated chunk size".to_string()))?;
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        // Chunk extensions follow a ';'
        let size_text = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| RpcError::Http(format!("invalid chunk size {:?}", size_text)))?;
        data = &data[line_end + 2..];

        if size == 0 {
            break;
        }
        if data.len() < size {
            return Err(RpcError::Http(format!(
                "chunk has {} of {} bytes",
                data.len(),
                size
            )));
        }
        body.extend_from_slice(&data[..size]);
        data = &data[size..];
        data = data.strip_prefix(b"\r\n").unwrap_or(data);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_length_response() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 5\r\n\r\nhello";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.body, b"hello");
        assert!(response.is_success());
    }

    #[test]
    fn test_parse_chunked_without_terminator() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.body, b"Wikipedia");
    }

    #[test]
    fn test_parse_chunked_with_terminator() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\na\r\n0123456789\r\n0\r\n\r\n";
        assert_eq!(parse_response(raw).unwrap().body, b"0123456789");
    }

    #[test]
    fn test_short_body_is_rejected() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort";
        assert!(matches!(parse_response(raw), Err(RpcError::Http(_))));
    }

    #[test]
    fn test_incomplete_head_is_rejected() {
        assert!(matches!(
            parse_response(b"HTTP/1.1 200 OK\r\nContent-"),
            Err(RpcError::Http(_))
        ));
        assert_eq!(parse_head(b"HTTP/1.1 200 OK\r\n").unwrap(), None);
    }

    #[test]
    fn test_error_status() {
        let raw = b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }
}
