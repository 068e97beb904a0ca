//! gsmtcp - TCP and JSON-RPC over an AT-command cellular modem
//!
//! Drives a SIM800-class modem over a serial link and exposes its TCP
//! connection as an ordinary async byte stream, plus a small JSON-RPC client
//! that runs on top of it.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `gsmtcp-core`: Error handling and session configuration
//! - `gsmtcp-transport`: Serial link and power key GPIO
//! - `gsmtcp-session`: AT command session, power control, network registration
//! - `gsmtcp-client`: TCP channel, byte stream and modem lifecycle
//! - `gsmtcp-rpc`: Response framing, HTTP parsing and the JSON-RPC client
//!
//! # Usage
//!
//! ```no_run
//! use gsmtcp::client::Modem;
//! use gsmtcp::rpc::RpcClient;
//! use gsmtcp::transport::SysfsPin;
//! use gsmtcp::SessionConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pin = SysfsPin::export(17).await?;
//! let mut modem = Modem::open_serial("/dev/ttyS0", pin, SessionConfig::default())?;
//! modem.init().await?;
//!
//! let stream = modem.connect("rpc.example.com:80").await?;
//! let mut rpc = RpcClient::new(stream, "rpc.example.com");
//! let height: u64 = rpc.call("block_height", ()).await?;
//! println!("height {}", height);
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use gsmtcp_core::{ConfigOption, GsmError, GsmResult, SessionConfig};

pub mod transport {
    pub use gsmtcp_transport::*;
}

pub mod session {
    pub use gsmtcp_session::*;
}

pub mod client {
    pub use gsmtcp_client::*;
}

pub mod rpc {
    pub use gsmtcp_rpc::*;
}
