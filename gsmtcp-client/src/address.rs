//! Remote endpoint addresses

use gsmtcp_core::{GsmError, GsmResult};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Remote endpoint of a modem TCP connection
///
/// The host is passed to the modem as written; it may be a name the modem
/// resolves itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddress {
    host: String,
    port: u16,
}

impl RemoteAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host as an IPv4 address, if it is a dotted quad
    pub fn ip(&self) -> Option<Ipv4Addr> {
        parse_dotted_quad(&self.host)
    }
}

impl FromStr for RemoteAddress {
    type Err = GsmError;

    /// Parse `host:port`, trimming whitespace around both parts
    fn from_str(address: &str) -> GsmResult<Self> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| GsmError::InvalidData(format!("missing port in address {:?}", address)))?;
        let host = host.trim();
        if host.is_empty() {
            return Err(GsmError::InvalidData(format!(
                "missing host in address {:?}",
                address
            )));
        }
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|e| GsmError::InvalidData(format!("invalid port in address {:?}: {}", address, e)))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse a dotted-quad IPv4 address; anything else yields `None`
pub fn parse_dotted_quad(text: &str) -> Option<Ipv4Addr> {
    text.trim().parse().ok()
}
