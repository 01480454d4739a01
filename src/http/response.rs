//! Response formatting: status lines, the standard no-cache header block
//! sent with every answer, and plain-text error bodies.

use std::io::Write;
use std::net::TcpStream;

pub const SERVER_NAME: &str = concat!("mjpeg-relay/", env!("CARGO_PKG_VERSION"));

/// Header block appended to every response. Browsers must not cache frames:
/// a cached snapshot would silently show stale pictures.
pub fn std_headers() -> String {
    format!(
        "Connection: close\r\n\
         Server: {}\r\n\
         Cache-Control: no-store, no-cache, must-revalidate, pre-check=0, post-check=0, max-age=0\r\n\
         Pragma: no-cache\r\n\
         Expires: Mon, 3 Jan 2000 12:34:56 GMT\r\n",
        SERVER_NAME
    )
}

pub fn status_line(code: u16) -> &'static str {
    match code {
        200 => "HTTP/1.0 200 OK",
        400 => "HTTP/1.0 400 Bad Request",
        401 => "HTTP/1.0 401 Unauthorized",
        404 => "HTTP/1.0 404 Not Found",
        500 => "HTTP/1.0 500 Internal Server Error",
        _ => "HTTP/1.0 501 Not Implemented",
    }
}

fn reason(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        401 => "Not Authenticated",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Not Implemented",
    }
}

/// Send a plain-text error response. Terminates only this connection; the
/// caller closes the stream afterwards.
pub fn send_error(stream: &mut TcpStream, code: u16, message: &str) -> std::io::Result<()> {
    let auth_challenge = if code == 401 {
        "WWW-Authenticate: Basic realm=\"mjpeg-relay\"\r\n"
    } else {
        ""
    };
    let response = format!(
        "{}\r\nContent-type: text/plain\r\n{}{}\r\n{}: {}!\r\n{}\r\n",
        status_line(code),
        std_headers(),
        auth_challenge,
        code,
        reason(code),
        message
    );
    stream.write_all(response.as_bytes())
}

/// Send a complete `200` response with a body.
pub fn send_ok(stream: &mut TcpStream, content_type: &str, body: &[u8]) -> std::io::Result<()> {
    let header = format!(
        "{}\r\nContent-type: {}\r\nContent-Length: {}\r\n{}\r\n",
        status_line(200),
        content_type,
        body.len(),
        std_headers()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)
}
