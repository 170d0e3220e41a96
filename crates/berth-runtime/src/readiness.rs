//! Readiness strategies: block the calling thread until a container is usable.
//!
//! Both strategies wait without bound unless a timeout is given.

use crate::provider::LogStream;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("log stream ended before '{0}' appeared")]
    LogExhausted(String),
    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },
    #[error("wait for {0} was cancelled")]
    Cancelled(String),
    #[error("failed to read log stream: {0}")]
    Stream(#[source] io::Error),
}

/// Outcome of a log wait that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogWait {
    Matched { line: String, lines_read: usize },
    /// The stream ended without the awaited text.
    Exhausted { lines_read: usize },
}

impl LogWait {
    pub fn matched(&self) -> bool {
        matches!(self, LogWait::Matched { .. })
    }
}

/// Consume `stream` until a line contains `needle`.
///
/// A reader thread feeds the lines over a channel so the deadline and
/// `cancelled` are honored even while the stream is silent. `cancelled` is
/// checked every [`DEFAULT_POLL_INTERVAL`].
pub fn wait_for_log(
    stream: LogStream,
    needle: &str,
    timeout: Option<Duration>,
    cancelled: fn() -> bool,
) -> Result<LogWait, ReadinessError> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in stream {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let started = Instant::now();
    let mut lines_read = 0;
    loop {
        let slice = match timeout {
            Some(timeout) => timeout
                .saturating_sub(started.elapsed())
                .min(DEFAULT_POLL_INTERVAL),
            None => DEFAULT_POLL_INTERVAL,
        };
        match rx.recv_timeout(slice) {
            Ok(line) => {
                let line = line.map_err(ReadinessError::Stream)?;
                lines_read += 1;
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                trace!("[log] {text}");
                if text.contains(needle) {
                    debug!("log line matched '{needle}' after {lines_read} line(s)");
                    return Ok(LogWait::Matched {
                        line: text.to_owned(),
                        lines_read,
                    });
                }
            }
            Err(RecvTimeoutError::Timeout) if cancelled() => {
                return Err(ReadinessError::Cancelled(format!("log line '{needle}'")));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(LogWait::Exhausted { lines_read }),
        }
        if timeout.is_some_and(|t| started.elapsed() >= t) {
            return Err(ReadinessError::Timeout {
                what: format!("log line '{needle}'"),
                elapsed: started.elapsed(),
            });
        }
    }
}

/// A single connection attempt; success means the port accepts connections.
pub trait Connector {
    fn connect(&self, addr: SocketAddr) -> io::Result<()>;
}

/// Plain TCP connect, closed again immediately.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub connect_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        TcpStream::connect_timeout(&addr, self.connect_timeout).map(drop)
    }
}

/// Polling parameters for [`wait_for_port`].
#[derive(Debug, Clone, Copy)]
pub struct PortPoll {
    pub interval: Duration,
    pub timeout: Option<Duration>,
    /// Checked after every failed attempt.
    pub cancelled: fn() -> bool,
}

impl Default for PortPoll {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            cancelled: || false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortWait {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Connect to `addr` until it succeeds, sleeping `poll.interval` between attempts.
pub fn wait_for_port<C: Connector + ?Sized>(
    connector: &C,
    addr: SocketAddr,
    poll: &PortPoll,
) -> Result<PortWait, ReadinessError> {
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match connector.connect(addr) {
            Ok(()) => {
                let elapsed = started.elapsed();
                debug!("port {addr} is now responding ({attempts} attempt(s), {elapsed:?})");
                return Ok(PortWait { attempts, elapsed });
            }
            Err(e) => debug!("waiting for port {addr} to respond ({e})"),
        }

        if (poll.cancelled)() {
            return Err(ReadinessError::Cancelled(format!("port {addr}")));
        }
        if let Some(timeout) = poll.timeout {
            if started.elapsed() + poll.interval > timeout {
                return Err(ReadinessError::Timeout {
                    what: format!("port {addr}"),
                    elapsed: started.elapsed(),
                });
            }
        }
        std::thread::sleep(poll.interval);
    }
}
