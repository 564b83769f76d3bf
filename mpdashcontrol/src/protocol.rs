//! Client side of the MPD line protocol.
//!
//! A connection starts with the greeting `OK MPD <version>`. Each command is one line,
//! arguments double-quoted. The answer is a list of `key: value` lines closed by `OK`,
//! or a single `ACK [code@index] {command} message` line. A `binary: N` line is followed
//! by N raw bytes and a newline.

use std::fmt;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::errors::{MpdError, MpdResult};
use crate::model::Pairs;

const GREETING: &str = "OK MPD ";

/// A command line to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    args: Vec<String>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Wire form, newline included.
    pub fn to_line(&self) -> String {
        let mut line = String::from(self.name);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line.push('\n');
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_line().trim_end())
    }
}

fn quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Parsed answer to one command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub pairs: Pairs,
    pub binary: Option<Vec<u8>>,
}

impl Response {
    /// First value for `key` (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value whose key is `key` (case-insensitive).
    pub fn values(&self, key: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// Parses `ACK [code@index] {command} message`.
pub fn parse_ack(line: &str) -> MpdError {
    let fallback = || MpdError::Command {
        code: 0,
        command: String::new(),
        message: line.to_string(),
    };

    let Some(rest) = line.strip_prefix("ACK [") else {
        return fallback();
    };
    let Some((code, rest)) = rest.split_once('@') else {
        return fallback();
    };
    let Some((_, rest)) = rest.split_once("] {") else {
        return fallback();
    };
    let Some((command, message)) = rest.split_once('}') else {
        return fallback();
    };

    MpdError::Command {
        code: code.trim().parse().unwrap_or(0),
        command: command.to_string(),
        message: message.trim().to_string(),
    }
}

/// One open connection to the daemon.
pub struct MpdConnection<S> {
    stream: BufReader<S>,
    version: String,
}

impl<S> MpdConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Reads the greeting and returns the ready connection.
    pub async fn handshake(stream: S) -> MpdResult<Self> {
        let mut stream = BufReader::new(stream);
        let line = read_line(&mut stream).await?;
        let version = line
            .strip_prefix(GREETING)
            .ok_or_else(|| MpdError::protocol(format!("unexpected greeting: {}", line)))?
            .trim()
            .to_string();

        Ok(Self { stream, version })
    }

    /// Daemon protocol version from the greeting, e.g. `0.23.5`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub async fn execute(&mut self, command: &Command) -> MpdResult<Response> {
        trace!("MPD > {}", command);
        self.stream.write_all(command.to_line().as_bytes()).await?;
        self.stream.flush().await?;
        self.read_response().await
    }

    async fn read_response(&mut self) -> MpdResult<Response> {
        let mut response = Response::default();
        loop {
            let line = read_line(&mut self.stream).await?;
            if line == "OK" {
                return Ok(response);
            }
            if line.starts_with("ACK ") {
                return Err(parse_ack(&line));
            }

            let Some((key, value)) = line.split_once(": ") else {
                return Err(MpdError::protocol(format!("malformed line: {}", line)));
            };

            if key == "binary" {
                let size: usize = value
                    .parse()
                    .map_err(|_| MpdError::protocol(format!("bad binary size: {}", value)))?;
                let mut chunk = vec![0u8; size];
                self.stream.read_exact(&mut chunk).await?;
                let mut newline = [0u8; 1];
                self.stream.read_exact(&mut newline).await?;
                response.binary = Some(chunk);
                continue;
            }

            response.pairs.push((key.to_string(), value.to_string()));
        }
    }
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> MpdResult<String> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Err(MpdError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by MPD",
        )));
    }
    let line = String::from_utf8(buf).map_err(|_| MpdError::protocol("invalid UTF-8 in response"))?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Compares a dotted version against `major.minor`.
pub fn version_at_least(version: &str, major: u32, minor: u32) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let have = (parts.next().unwrap_or(0), parts.next().unwrap_or(0));
    have >= (major, minor)
}
