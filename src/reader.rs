//! Candidate feed reader.
//!
//! The feed may be arbitrarily large, so it is consumed one line at a time
//! through an async buffered reader with a bounded per-line buffer. Each
//! line is then searched for the first syntactically valid IP address.

use anyhow::{Context, Result};
use regex::Regex;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::OnceLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::error::InformerError;

/// Bytes kept per line; the rest of an over-long line is discarded
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Boxed reader type for feeds opened by path or from stdin
pub type FeedReader = CandidateReader<Box<dyn AsyncBufRead + Unpin + Send>>;

/// Line-at-a-time reader over the candidate feed
pub struct CandidateReader<R> {
    reader: R,
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl<R: AsyncBufRead + Unpin> CandidateReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            max_line_bytes: MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Read the next line without its terminator (`\n` or `\r\n`).
    ///
    /// Returns `Ok(None)` at end of feed. A last line without a terminator
    /// is still returned. Invalid UTF-8 is replaced, never rejected.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let mut saw_bytes = false;
        let mut truncated = false;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if !saw_bytes {
                    return Ok(None);
                }
                break;
            }
            saw_bytes = true;

            let (chunk, consumed, done) = match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (&available[..pos], pos + 1, true),
                None => (available, available.len(), false),
            };

            let room = self.max_line_bytes.saturating_sub(self.buf.len());
            if chunk.len() > room {
                truncated = true;
                self.buf.extend_from_slice(&chunk[..room]);
            } else {
                self.buf.extend_from_slice(chunk);
            }

            self.reader.consume(consumed);
            if done {
                break;
            }
        }

        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        if truncated {
            debug!("Line longer than {} bytes truncated", self.max_line_bytes);
        }

        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Open the candidate feed; `-` reads standard input
pub async fn open_feed(path: &Path) -> Result<FeedReader> {
    if path == Path::new("-") {
        let stdin: Box<dyn AsyncBufRead + Unpin + Send> =
            Box::new(BufReader::new(tokio::io::stdin()));
        return Ok(CandidateReader::new(stdin));
    }

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| InformerError::Input(format!("unable to open {:?} ({})", path, e)))
        .context("Cannot open the candidate feed")?;
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(BufReader::new(file));
    Ok(CandidateReader::new(reader))
}

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"[0-9A-Fa-f:.]+").expect("token regex is valid"))
}

/// Return the first valid IPv4/IPv6 address in `line`, verbatim.
///
/// Candidates are maximal runs of hex digits, `.` and `:`. A run that is
/// not an address as a whole may still hold a dotted quad glued to a label
/// or port (`addr:192.0.2.1`, `198.51.100.4:8443`, `fe1.2.3.4`); the first
/// such quad is returned.
pub fn extract_ip(line: &str) -> Option<&str> {
    token_regex()
        .find_iter(line)
        .find_map(|m| valid_ip_token(m.as_str()))
}

fn valid_ip_token(token: &str) -> Option<&str> {
    let token = token.trim_matches('.');

    // "::" and friends carry no digits; not worth reporting
    if !token.bytes().any(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    // Whole token first, so "::ffff:1.2.3.4" stays IPv6
    if token.parse::<IpAddr>().is_ok() {
        return Some(token);
    }

    token.split(':').find_map(dotted_quad)
}

fn dotted_quad(segment: &str) -> Option<&str> {
    let quad = segment.trim_matches(|c: char| c == '.' || c.is_ascii_alphabetic());
    if quad.contains('.') && quad.parse::<Ipv4Addr>().is_ok() {
        Some(quad)
    } else {
        None
    }
}
