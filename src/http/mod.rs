//! HTTP streaming server.
//!
//! Listens on one or more addresses and serves every connected client from
//! its own worker thread: single JPEG snapshots, long-lived
//! `multipart/x-mixed-replace` streams, control commands, JSON descriptor
//! documents and static files, optionally gated behind HTTP Basic
//! authentication. The protocol is a minimal hand-written HTTP/1.0
//! implementation; only `GET` over `HTTP/1.0`/`HTTP/1.1` is accepted.

pub mod files;
pub mod json;
pub mod request;
pub mod response;

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::command::{Command, CommandRouter};
use crate::context::{StreamerContext, SHUTDOWN_GRACE};
use crate::http::request::{read_request, source_suffix, HttpRequest};
use crate::http::response::{send_error, send_ok, std_headers};

/// Boundary token separating multipart stream frames. Never appears inside
/// JPEG data.
pub const BOUNDARY: &str = "mjpegrelayframe";

/// Stalled client writes are abandoned after this long so a stuck stream
/// consumer cannot pin its worker across shutdown.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval of the nonblocking accept loops.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// Listen addresses; bind one listener per entry (e.g. v4 + v6).
    pub addrs: Vec<String>,
    /// Web root for static files; `None` disables file serving.
    pub www_root: Option<PathBuf>,
    /// `user:pass` Basic credentials; `None` disables authentication.
    pub credentials: Option<String>,
    /// When false, `action=command` answers `501`.
    pub enable_commands: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addrs: vec!["0.0.0.0:8080".to_string()],
            www_root: None,
            credentials: None,
            enable_commands: true,
        }
    }
}

pub struct HttpServer {
    cfg: HttpConfig,
    ctx: Arc<StreamerContext>,
}

/// Running server handle: bound addresses plus the listener threads and the
/// live-connection gauge used to drain workers on shutdown.
pub struct HttpHandle {
    pub addrs: Vec<SocketAddr>,
    ctx: Arc<StreamerContext>,
    stop: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    listeners: Vec<JoinHandle<()>>,
}

impl HttpServer {
    pub fn new(cfg: HttpConfig, ctx: Arc<StreamerContext>) -> Self {
        Self { cfg, ctx }
    }

    /// Bind every configured address and spawn one listener thread each.
    pub fn spawn(self) -> Result<HttpHandle> {
        if self.cfg.addrs.is_empty() {
            return Err(anyhow!("http server needs at least one listen address"));
        }
        let stop = self.ctx.stop_flag();
        let active = Arc::new(AtomicUsize::new(0));
        let cfg = Arc::new(self.cfg);

        let mut addrs = Vec::new();
        let mut listeners = Vec::new();
        for addr in &cfg.addrs {
            let listener = TcpListener::bind(addr.as_str())
                .map_err(|e| anyhow!("failed to bind {}: {}", addr, e))?;
            listener.set_nonblocking(true)?;
            addrs.push(listener.local_addr()?);

            let ctx = self.ctx.clone();
            let cfg = cfg.clone();
            let stop = stop.clone();
            let active = active.clone();
            listeners.push(std::thread::spawn(move || {
                listener_loop(listener, ctx, cfg, stop, active);
            }));
        }

        Ok(HttpHandle {
            addrs,
            ctx: self.ctx,
            stop,
            active,
            listeners,
        })
    }
}

impl HttpHandle {
    /// Stop accepting, wake blocked stream workers, and wait up to the grace
    /// period for live connections to drain.
    pub fn stop(mut self) -> Result<()> {
        self.ctx.request_stop();
        for join in self.listeners.drain(..) {
            join.join()
                .map_err(|_| anyhow!("http listener thread panicked"))?;
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while self.active.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        let leftover = self.active.load(Ordering::SeqCst);
        if leftover > 0 {
            log::warn!("{} http client(s) still connected after grace period", leftover);
        }
        Ok(())
    }
}

fn listener_loop(
    listener: TcpListener,
    ctx: Arc<StreamerContext>,
    cfg: Arc<HttpConfig>,
    stop: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
) {
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("serving client {}", peer);
                let ctx = ctx.clone();
                let cfg = cfg.clone();
                let active = active.clone();
                // Counted before the worker exists, so a connection accepted
                // right before stop is already visible to the drain wait.
                active.fetch_add(1, Ordering::SeqCst);
                std::thread::spawn(move || {
                    if let Err(err) = handle_client(stream, &ctx, &cfg) {
                        log::debug!("client {} dropped: {}", peer, err);
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                log::error!("accept failed: {}", err);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Request dispatch
// ----------------------------------------------------------------------------

/// What the client asked for, after path/query classification.
enum Route {
    Snapshot(usize),
    Stream(usize),
    Command,
    InputJson(usize),
    OutputJson(usize),
    ProgramJson,
    File(String),
}

fn classify(req: &HttpRequest) -> Result<Route, &'static str> {
    if req.path == "/" {
        if let Some(action) = req.query_param("action") {
            if let Some(input) = source_suffix(action, "snapshot") {
                return Ok(Route::Snapshot(input));
            }
            if let Some(input) = source_suffix(action, "stream") {
                return Ok(Route::Stream(input));
            }
            if action == "command" {
                return Ok(Route::Command);
            }
            if action.starts_with("snapshot") || action.starts_with("stream") {
                return Err("malformed source index suffix");
            }
            return Err("unknown action");
        }
        return Ok(Route::File("/".to_string()));
    }

    if req.path == "/program.json" {
        return Ok(Route::ProgramJson);
    }
    if let Some(index) = json_index(&req.path, "/input") {
        return Ok(Route::InputJson(index));
    }
    if let Some(index) = json_index(&req.path, "/output") {
        return Ok(Route::OutputJson(index));
    }
    Ok(Route::File(req.path.clone()))
}

/// `/input<N>.json` style index; bare `/input.json` selects module 0.
fn json_index(path: &str, prefix: &str) -> Option<usize> {
    let digits = path.strip_prefix(prefix)?.strip_suffix(".json")?;
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

fn handle_client(mut stream: TcpStream, ctx: &StreamerContext, cfg: &HttpConfig) -> Result<()> {
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let req = match read_request(&stream) {
        Ok(req) => req,
        Err(err) => {
            // Too broken to answer; includes the read-timeout case.
            let _ = send_error(&mut stream, 400, "Malformed HTTP request");
            return Err(err);
        }
    };

    if req.method != "GET" {
        send_error(&mut stream, 501, "only GET requests are implemented")?;
        return Ok(());
    }
    if req.version != "HTTP/1.0" && req.version != "HTTP/1.1" {
        send_error(&mut stream, 400, "unsupported protocol version")?;
        return Ok(());
    }

    // Authentication gates every request type.
    if let Some(expected) = &cfg.credentials {
        if req.basic_credentials().as_deref() != Some(expected.as_str()) {
            send_error(&mut stream, 401, "username and password do not match")?;
            return Ok(());
        }
    }

    let route = match classify(&req) {
        Ok(route) => route,
        Err(reason) => {
            send_error(&mut stream, 400, reason)?;
            return Ok(());
        }
    };

    match route {
        Route::Snapshot(input) => match ctx.input(input) {
            Some(slot) => send_snapshot(&mut stream, slot.channel().clone())?,
            None => send_error(&mut stream, 404, "invalid input source index")?,
        },
        Route::Stream(input) => match ctx.input(input) {
            Some(slot) => send_stream(&mut stream, slot.channel().clone())?,
            None => send_error(&mut stream, 404, "invalid input source index")?,
        },
        Route::Command => {
            if cfg.enable_commands {
                handle_command(&mut stream, ctx, &req)?;
            } else {
                send_error(&mut stream, 501, "this server does not accept commands")?;
            }
        }
        Route::InputJson(index) => {
            if index < ctx.inputs().len() {
                send_ok(&mut stream, "application/json", &json::input_descriptor(ctx, index)?)?;
            } else {
                send_error(&mut stream, 404, "invalid input module number")?;
            }
        }
        Route::OutputJson(index) => {
            if index < ctx.outputs().len() {
                send_ok(&mut stream, "application/json", &json::output_descriptor(ctx, index)?)?;
            } else {
                send_error(&mut stream, 404, "invalid output module number")?;
            }
        }
        Route::ProgramJson => {
            send_ok(&mut stream, "application/json", &json::program_descriptor(ctx)?)?;
        }
        Route::File(path) => send_file(&mut stream, cfg, &path)?,
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Responders
// ----------------------------------------------------------------------------

/// One complete response with a single JPEG frame.
fn send_snapshot(stream: &mut TcpStream, channel: Arc<crate::channel::FrameChannel>) -> Result<()> {
    let mut reader = channel.reader();
    let mut frame = Vec::new();
    let Some((len, timestamp)) = reader.wait_and_copy(&mut frame) else {
        // Stopped before a frame arrived; the connection just closes.
        return Ok(());
    };

    let header = format!(
        "HTTP/1.0 200 OK\r\n\
         Access-Control-Allow-Origin: *\r\n\
         {}\
         Content-type: image/jpeg\r\n\
         Content-Length: {}\r\n\
         X-Timestamp: {}\r\n\
         \r\n",
        std_headers(),
        len,
        timestamp
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&frame[..len])?;
    Ok(())
}

/// The long-lived multipart stream loop: one part per published frame until
/// the process stops or the client goes away.
fn send_stream(stream: &mut TcpStream, channel: Arc<crate::channel::FrameChannel>) -> Result<()> {
    let head = format!(
        "HTTP/1.0 200 OK\r\n\
         Access-Control-Allow-Origin: *\r\n\
         {}\
         Content-Type: multipart/x-mixed-replace;boundary={}\r\n\
         \r\n\
         --{}\r\n",
        std_headers(),
        BOUNDARY,
        BOUNDARY
    );
    stream.write_all(head.as_bytes())?;

    let mut reader = channel.reader();
    let mut frame = Vec::new();
    while let Some((len, timestamp)) = reader.wait_and_copy(&mut frame) {
        let part_header = format!(
            "Content-Type: image/jpeg\r\n\
             Content-Length: {}\r\n\
             X-Timestamp: {}\r\n\
             \r\n",
            len, timestamp
        );
        if stream.write_all(part_header.as_bytes()).is_err()
            || stream.write_all(&frame[..len]).is_err()
            || stream
                .write_all(format!("\r\n--{}\r\n", BOUNDARY).as_bytes())
                .is_err()
        {
            // Client disconnected; only this connection ends.
            break;
        }
    }
    Ok(())
}

/// `action=command`: parse the numeric query parameters, dispatch through
/// the router and answer with `"<id>: <code>"`.
fn handle_command(stream: &mut TcpStream, ctx: &StreamerContext, req: &HttpRequest) -> Result<()> {
    let Some(id_raw) = req.query_param("id") else {
        send_error(stream, 400, "no GET variable \"id=...\" found")?;
        return Ok(());
    };

    let numeric = |key: &str, default: i64| -> Result<i64, ()> {
        match req.query_param(key) {
            Some(raw) => raw.parse().map_err(|_| ()),
            None => Ok(default),
        }
    };

    let parsed = (|| -> Result<Command, ()> {
        Ok(Command {
            control_id: id_raw.parse().map_err(|_| ())?,
            value: numeric("value", 0)?,
            group: numeric("group", 0)?,
            dest: numeric("dest", crate::command::DEST_INPUT)?,
            module: numeric("plugin", 0)?,
            value_string: None,
        })
    })();

    let cmd = match parsed {
        Ok(cmd) => cmd,
        Err(()) => {
            send_error(stream, 400, "command parameters must be numeric")?;
            return Ok(());
        }
    };

    let code = match CommandRouter::dispatch(ctx, &cmd) {
        Ok(code) => code,
        Err(err) => {
            log::debug!("command rejected: {}", err);
            err.code()
        }
    };
    let body = format!("{}: {}", cmd.control_id, code);
    send_ok(stream, "text/plain", body.as_bytes())?;
    Ok(())
}

fn send_file(stream: &mut TcpStream, cfg: &HttpConfig, path: &str) -> Result<()> {
    let Some(root) = &cfg.www_root else {
        send_error(stream, 501, "no www-folder configured")?;
        return Ok(());
    };
    match files::resolve(root, path) {
        Ok((full, mimetype)) => {
            let body = std::fs::read(&full)?;
            send_ok(stream, mimetype, &body)?;
        }
        Err(files::FileError::BadExtension) => {
            send_error(stream, 400, "no file extension found or extension not supported")?;
        }
        Err(files::FileError::NotFound) => {
            send_error(stream, 404, "could not open file")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn classify_raw(raw: &str) -> Result<Route, &'static str> {
        let req = request::parse_request(&mut Cursor::new(raw.as_bytes())).unwrap();
        classify(&req)
    }

    #[test]
    fn actions_route_with_source_suffix() {
        assert!(matches!(
            classify_raw("GET /?action=snapshot HTTP/1.0\r\n\r\n"),
            Ok(Route::Snapshot(0))
        ));
        assert!(matches!(
            classify_raw("GET /?action=stream_12 HTTP/1.0\r\n\r\n"),
            Ok(Route::Stream(12))
        ));
        assert!(matches!(
            classify_raw("GET /?action=command&id=1 HTTP/1.0\r\n\r\n"),
            Ok(Route::Command)
        ));
        assert!(classify_raw("GET /?action=stream_x HTTP/1.0\r\n\r\n").is_err());
        assert!(classify_raw("GET /?action=reboot HTTP/1.0\r\n\r\n").is_err());
    }

    #[test]
    fn json_paths_route_with_index() {
        assert!(matches!(
            classify_raw("GET /input0.json HTTP/1.0\r\n\r\n"),
            Ok(Route::InputJson(0))
        ));
        assert!(matches!(
            classify_raw("GET /input.json HTTP/1.0\r\n\r\n"),
            Ok(Route::InputJson(0))
        ));
        assert!(matches!(
            classify_raw("GET /output3.json HTTP/1.0\r\n\r\n"),
            Ok(Route::OutputJson(3))
        ));
        assert!(matches!(
            classify_raw("GET /program.json HTTP/1.0\r\n\r\n"),
            Ok(Route::ProgramJson)
        ));
        // Non-numeric indices fall through to file serving.
        assert!(matches!(
            classify_raw("GET /inputX.json HTTP/1.0\r\n\r\n"),
            Ok(Route::File(_))
        ));
    }

    #[test]
    fn bare_paths_route_to_files() {
        assert!(matches!(
            classify_raw("GET / HTTP/1.0\r\n\r\n"),
            Ok(Route::File(p)) if p == "/"
        ));
        assert!(matches!(
            classify_raw("GET /viewer.html HTTP/1.0\r\n\r\n"),
            Ok(Route::File(p)) if p == "/viewer.html"
        ));
    }
}
