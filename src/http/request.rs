//! HTTP request parsing: a timeout-bounded, size-capped line reader over the
//! client socket, a request-line/header parser, and the small helpers the
//! dispatcher needs (query parameters, Basic credentials, source suffix).

use std::collections::HashMap;
use std::io::BufRead;
use std::net::TcpStream;
use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Per-read socket timeout. A client that stalls longer than this mid-header
/// is treated as dead.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the total request head (request line + headers).
const MAX_REQUEST_BYTES: usize = 8192;

/// Parsed request head.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    /// Path component, without the query string.
    pub path: String,
    pub query: Option<String>,
    /// `HTTP/1.0` or `HTTP/1.1` for supported clients.
    pub version: String,
    /// Header map with lowercased names.
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Value of a `key=value` pair in the query string.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        let query = self.query.as_deref()?;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("user-agent").map(String::as_str)
    }

    /// Decoded `user:pass` from an `Authorization: Basic` header.
    pub fn basic_credentials(&self) -> Option<String> {
        let value = self.headers.get("authorization")?;
        let mut parts = value.split_whitespace();
        if !parts.next()?.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = BASE64.decode(parts.next()?).ok()?;
        String::from_utf8(decoded).ok()
    }
}

/// Read and parse one request head from a client socket.
pub fn read_request(stream: &TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut reader = std::io::BufReader::new(stream);
    parse_request(&mut reader)
}

/// Parse a request head from any buffered reader. Split out from the socket
/// plumbing so it can be tested without a connection.
pub fn parse_request(reader: &mut impl BufRead) -> Result<HttpRequest> {
    // Hard cap on bytes pulled from the socket. Without it a single header
    // line with no newline would be buffered without bound; one byte past
    // the budget is allowed through so the overflow surfaces as the
    // structured size error below rather than a bare EOF.
    let mut reader = std::io::Read::take(reader, MAX_REQUEST_BYTES as u64 + 1);
    let mut budget = MAX_REQUEST_BYTES;

    let request_line = read_line(&mut reader, &mut budget)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("empty request line"))?;
    let target = parts
        .next()
        .ok_or_else(|| anyhow!("request line without a path"))?;
    let version = parts
        .next()
        .ok_or_else(|| anyhow!("request line without a protocol version"))?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };

    let mut headers = HashMap::new();
    loop {
        let line = read_line(&mut reader, &mut budget)?;
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
        version: version.to_string(),
        headers,
    })
}

fn read_line(reader: &mut impl BufRead, budget: &mut usize) -> Result<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Err(anyhow!("connection closed before request was complete"));
    }
    *budget = budget
        .checked_sub(n)
        .ok_or_else(|| anyhow!("request head exceeds {} bytes", MAX_REQUEST_BYTES))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Parse the trailing `_<digits>` source selector of an action value, e.g.
/// `stream_2`. No suffix selects source 0. The whole decimal run is parsed,
/// so more than ten sources are addressable.
pub fn source_suffix(action: &str, base: &str) -> Option<usize> {
    let rest = action.strip_prefix(base)?;
    if rest.is_empty() {
        return Some(0);
    }
    rest.strip_prefix('_')?.parse().ok()
}
