//! Scripted modem for tests
//!
//! `ScriptedModem` plays the modem's side of an in-memory duplex pipe. It
//! walks a fixed script: wait for a command line (matched by prefix) or a
//! raw payload of known length, then answer with canned output. Everything it
//! receives is recorded so tests can assert on the exact command sequence.

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone)]
enum Step {
    Line { prefix: String, reply: Vec<u8> },
    Raw { len: usize, reply: Vec<u8> },
    Emit(Vec<u8>),
}

/// Something the scripted modem received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Line(String),
    Raw(Vec<u8>),
}

#[derive(Debug, Default)]
struct Transcript {
    received: Vec<Received>,
    errors: Vec<String>,
}

/// Script of modem behaviour
#[derive(Debug, Clone, Default)]
pub struct ScriptedModem {
    steps: Vec<Step>,
}

impl ScriptedModem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a command line starting with `prefix`, then write `reply`
    ///
    /// An empty reply leaves the command unanswered.
    pub fn on(mut self, prefix: &str, reply: impl AsRef<[u8]>) -> Self {
        self.steps.push(Step::Line {
            prefix: prefix.to_string(),
            reply: reply.as_ref().to_vec(),
        });
        self
    }

    /// Expect `len` raw payload bytes, then write `reply`
    pub fn on_raw(mut self, len: usize, reply: impl AsRef<[u8]>) -> Self {
        self.steps.push(Step::Raw {
            len,
            reply: reply.as_ref().to_vec(),
        });
        self
    }

    /// Write `output` without waiting for input
    pub fn emit(mut self, output: impl AsRef<[u8]>) -> Self {
        self.steps.push(Step::Emit(output.as_ref().to_vec()));
        self
    }

    /// Start the modem task and return the host's end of the pipe
    pub fn spawn(self) -> (DuplexStream, ModemHandle) {
        let (host, modem) = tokio::io::duplex(PIPE_CAPACITY);
        let transcript = Arc::new(Mutex::new(Transcript::default()));
        let task = tokio::spawn(run(self.steps, modem, transcript.clone()));
        (host, ModemHandle { transcript, task })
    }
}

async fn run(steps: Vec<Step>, modem: DuplexStream, transcript: Arc<Mutex<Transcript>>) {
    let (read_half, mut write_half) = tokio::io::split(modem);
    let mut reader = BufReader::new(read_half);
    let record = |entry: Received| transcript.lock().unwrap().received.push(entry);
    let fail = |message: String| transcript.lock().unwrap().errors.push(message);

    for step in steps {
        let reply = match step {
            Step::Line { prefix, reply } => {
                let mut raw = Vec::new();
                match reader.read_until(b'\n', &mut raw).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                let line = String::from_utf8_lossy(&raw)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if !line.starts_with(&prefix) {
                    fail(format!("expected {:?}, received {:?}", prefix, line));
                }
                record(Received::Line(line));
                reply
            }
            Step::Raw { len, reply } => {
                let mut payload = vec![0u8; len];
                if reader.read_exact(&mut payload).await.is_err() {
                    return;
                }
                record(Received::Raw(payload));
                reply
            }
            Step::Emit(output) => output,
        };
        if !reply.is_empty() && write_half.write_all(&reply).await.is_err() {
            return;
        }
    }

    // Script exhausted: keep the pipe open and record anything unexpected.
    loop {
        let mut raw = Vec::new();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                fail(format!("unscripted input {:?}", line));
                record(Received::Line(line));
            }
        }
    }
}

/// Observer of a running scripted modem
pub struct ModemHandle {
    transcript: Arc<Mutex<Transcript>>,
    task: JoinHandle<()>,
}

impl ModemHandle {
    /// Everything received so far, in order
    pub fn received(&self) -> Vec<Received> {
        self.transcript.lock().unwrap().received.clone()
    }

    /// Command lines received so far, in order
    pub fn lines(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter_map(|r| match r {
                Received::Line(line) => Some(line),
                Received::Raw(_) => None,
            })
            .collect()
    }

    /// Raw payloads received so far, in order
    pub fn raw_payloads(&self) -> Vec<Vec<u8>> {
        self.received()
            .into_iter()
            .filter_map(|r| match r {
                Received::Raw(payload) => Some(payload),
                Received::Line(_) => None,
            })
            .collect()
    }

    /// Script deviations observed so far
    pub fn errors(&self) -> Vec<String> {
        self.transcript.lock().unwrap().errors.clone()
    }

    /// Number of received lines starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.lines().iter().filter(|l| l.starts_with(prefix)).count()
    }
}

impl Drop for ModemHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
