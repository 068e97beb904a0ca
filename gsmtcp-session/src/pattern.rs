//! Response patterns matched against modem output

use gsmtcp_core::{GsmError, GsmResult};
use regex::bytes::Regex;

/// Expected modem reply
///
/// Patterns are searched for anywhere in the buffered output, not compared
/// line by line, because replies can be interleaved with echoed input and
/// blank lines.
#[derive(Debug, Clone)]
pub struct ResponsePattern {
    name: String,
    regex: Regex,
}

impl ResponsePattern {
    /// Pattern matching a fixed piece of text
    pub fn literal(text: &str) -> Self {
        Self {
            name: text.to_string(),
            regex: Regex::new(&regex::escape(text)).expect("escaped literal is a valid regex"),
        }
    }

    /// Pattern compiled from a regular expression
    ///
    /// # Errors
    /// Returns `GsmError::InvalidData` if the expression does not compile
    pub fn regex(name: impl Into<String>, expression: &str) -> GsmResult<Self> {
        let regex = Regex::new(expression).map_err(|e| {
            GsmError::InvalidData(format!("Invalid response pattern {}: {}", expression, e))
        })?;
        Ok(Self {
            name: name.into(),
            regex,
        })
    }

    fn marker(name: &str, expression: &str) -> Self {
        Self {
            name: name.to_string(),
            regex: Regex::new(expression).expect("marker expressions are valid"),
        }
    }

    /// Human readable name used in timeout errors and logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locate the leftmost occurrence of this pattern
    pub(crate) fn find_in(&self, haystack: &[u8]) -> Option<PatternHit> {
        let captures = self.regex.captures(haystack)?;
        let whole = captures.get(0)?;
        let groups = captures
            .iter()
            .skip(1)
            .map(|group| group.map(|g| String::from_utf8_lossy(g.as_bytes()).into_owned()))
            .collect();
        Some(PatternHit {
            start: whole.start(),
            end: whole.end(),
            groups,
        })
    }
}

pub(crate) struct PatternHit {
    pub start: usize,
    pub end: usize,
    pub groups: Vec<Option<String>>,
}

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Position of the matching pattern in the list that was waited on
    pub index: usize,
    /// Raw modem text that matched
    pub text: String,
    groups: Vec<Option<String>>,
}

impl Match {
    pub(crate) fn new(index: usize, text: String, groups: Vec<Option<String>>) -> Self {
        Self { index, text, groups }
    }

    /// Capture group `n` of the matching pattern (1-based)
    pub fn group(&self, n: usize) -> Option<&str> {
        n.checked_sub(1)
            .and_then(|i| self.groups.get(i))
            .and_then(|g| g.as_deref())
    }
}

/// Response markers emitted by SIMCom-style modems
pub mod markers {
    use super::ResponsePattern;
    use once_cell::sync::Lazy;

    /// Final result code `OK` at the start of a line
    pub static OK: Lazy<ResponsePattern> = Lazy::new(|| ResponsePattern::marker("OK", r"(?m)^OK\b"));
    /// Final result code `ERROR`, optionally as `+CME ERROR` / `+CMS ERROR`
    pub static ERROR: Lazy<ResponsePattern> =
        Lazy::new(|| ResponsePattern::marker("ERROR", r"(?m)^(?:\+CM[ES] )?ERROR"));
    pub static CONNECT_OK: Lazy<ResponsePattern> = Lazy::new(|| ResponsePattern::literal("CONNECT OK"));
    pub static CLOSE_OK: Lazy<ResponsePattern> = Lazy::new(|| ResponsePattern::literal("CLOSE OK"));
    pub static ALREADY_CONNECT: Lazy<ResponsePattern> =
        Lazy::new(|| ResponsePattern::literal("ALREADY CONNECT"));
    pub static STATE_TCP_CLOSED: Lazy<ResponsePattern> =
        Lazy::new(|| ResponsePattern::literal("STATE: TCP CLOSED"));
    pub static STATE_CONNECT_OK: Lazy<ResponsePattern> =
        Lazy::new(|| ResponsePattern::literal("STATE: CONNECT OK"));
    pub static CONNECT_FAIL: Lazy<ResponsePattern> = Lazy::new(|| ResponsePattern::literal("CONNECT FAIL"));
    pub static SEND_OK: Lazy<ResponsePattern> = Lazy::new(|| ResponsePattern::literal("SEND OK"));
    pub static SEND_FAIL: Lazy<ResponsePattern> = Lazy::new(|| ResponsePattern::literal("SEND FAIL"));
    /// Connection state line `STATE: <state>`; group 1 is the state text
    pub static CONNECTION_STATE: Lazy<ResponsePattern> =
        Lazy::new(|| ResponsePattern::marker("STATE: <state>", r"STATE: ([^\r\n]+)\r?\n"));
    /// Send capacity reply `+CIPSEND: <n>`; group 1 is the byte ceiling
    pub static SEND_CAPACITY: Lazy<ResponsePattern> =
        Lazy::new(|| ResponsePattern::marker("+CIPSEND: <n>", r"\+CIPSEND: ?([0-9]+)\r?\n"));
    /// Dotted-quad IPv4 address on its own line; group 1 is the address
    pub static IP_ADDRESS: Lazy<ResponsePattern> = Lazy::new(|| {
        ResponsePattern::marker("IP address", r"([0-9]{1,3}(?:\.[0-9]{1,3}){3})\r?\n")
    });
    /// Registration reply `+CGREG: <n>,<stat>`; group 1 is the status code
    pub static REGISTRATION: Lazy<ResponsePattern> = Lazy::new(|| {
        ResponsePattern::marker("+CGREG: <n>,<stat>", r"\+CGREG: ?[0-9]+,([0-9]+)[,\r\n]")
    });
}
