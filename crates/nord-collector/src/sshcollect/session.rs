use crate::CollectorError;
use anyhow::{Context, Result};
use regex::Regex;
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const READ_WAIT_TIMEOUT: Duration = Duration::from_secs(15);
/// Bound on the grow-until-match buffer so runaway device output cannot
/// blow up memory.
const MAX_CAPTURE: usize = 1024 * 1024;
/// Per-read poll bound; wait_for enforces the real deadline.
const POLL_MILLIS: u32 = 250;

/// What a `wait_for` produced: the captured output so far, and the error
/// that ended the wait when the pattern never matched. On timeout or EOF
/// the partial buffer is still returned for parsing.
pub struct WaitResult {
    pub output: String,
    pub error: Option<anyhow::Error>,
}

/// A stateful SSH shell session: one channel, commands piped through
/// stdin, stdout consumed until a regex matches.
pub struct InteractiveSession {
    _session: Session,
    channel: ssh2::Channel,
}

impl InteractiveSession {
    /// Dial, authenticate with a password, and open an interactive shell.
    ///
    /// Host key verification is skipped: the collector targets devices on
    /// the monitored network where keys churn with replacements.
    pub fn connect(user: &str, pass: &str, host: &str, port: u16) -> Result<InteractiveSession> {
        let addr = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("resolve {host}:{port}"))?
            .next()
            .ok_or_else(|| anyhow::anyhow!("no address for {host}:{port}"))?;

        let tcp = TcpStream::connect_timeout(&addr, DIAL_TIMEOUT)
            .with_context(|| format!("dial {addr}"))?;

        let mut session = Session::new().context("create SSH session")?;
        session.set_tcp_stream(tcp);
        session.handshake().context("SSH handshake")?;
        session
            .userauth_password(user, pass)
            .context("SSH password authentication")?;

        let mut channel = session.channel_session().context("open channel")?;
        channel
            .request_pty("vt100", None, None)
            .context("request pty")?;
        channel.shell().context("start shell")?;

        session.set_timeout(POLL_MILLIS);

        Ok(InteractiveSession {
            _session: session,
            channel,
        })
    }

    /// Write one command line to the shell.
    pub fn send(&mut self, cmd: &str) -> Result<()> {
        self.channel
            .write_all(format!("{cmd}\n").as_bytes())
            .context("write to shell")?;
        self.channel.flush().context("flush shell")?;
        Ok(())
    }

    /// Read from the shell until `pattern` matches the accumulated output
    /// or the read-wait timeout fires. The buffer is re-tested after every
    /// read.
    pub fn wait_for(&mut self, pattern: &str) -> WaitResult {
        let pattern = pattern.trim();
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                return WaitResult {
                    output: String::new(),
                    error: Some(anyhow::anyhow!("invalid regex pattern: {e}")),
                }
            }
        };

        let deadline = Instant::now() + READ_WAIT_TIMEOUT;
        let mut buffer: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            if Instant::now() >= deadline {
                return WaitResult {
                    output: String::from_utf8_lossy(&buffer).into_owned(),
                    error: Some(
                        CollectorError::WaitTimeout {
                            pattern: pattern.to_string(),
                        }
                        .into(),
                    ),
                };
            }

            match self.channel.read(&mut chunk) {
                Ok(0) => {
                    return WaitResult {
                        output: String::from_utf8_lossy(&buffer).into_owned(),
                        error: Some(anyhow::anyhow!("channel closed while waiting for {pattern}")),
                    }
                }
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if buffer.len() > MAX_CAPTURE {
                        return WaitResult {
                            output: String::from_utf8_lossy(&buffer).into_owned(),
                            error: Some(anyhow::anyhow!(
                                "output exceeded {MAX_CAPTURE} bytes waiting for {pattern}"
                            )),
                        };
                    }
                    let text = String::from_utf8_lossy(&buffer);
                    if re.is_match(&text) {
                        return WaitResult {
                            output: text.into_owned(),
                            error: None,
                        };
                    }
                }
                // Poll tick: the session read timeout elapsed without data.
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    return WaitResult {
                        output: String::from_utf8_lossy(&buffer).into_owned(),
                        error: Some(anyhow::Error::from(e).context("read from shell")),
                    }
                }
            }
        }
    }

    pub fn close(mut self) {
        let _ = self.channel.close();
        let _ = self.channel.wait_close();
    }
}
