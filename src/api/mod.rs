//! Read-only HTTP API for train status.
//!
//! Every request re-reads the backing documents through [`DataSources`], so
//! responses always reflect the last complete write of the rotation loop.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::query::{DataSources, TrainStatus};

const MAX_REQUEST_BYTES: usize = 8192;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Frontend bundle served for non-API paths.
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
            static_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    sources: DataSources,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, sources: DataSources) -> Self {
        Self { cfg, sources }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = Arc::new(self.cfg);
        let sources = self.sources;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, sources, shutdown_thread) {
                log::error!("train api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: Arc<ApiConfig>,
    sources: DataSources,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                let cfg = cfg.clone();
                let sources = sources.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &cfg, &sources) {
                        log::warn!("train api request failed: {}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, cfg: &ApiConfig, sources: &DataSources) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, &json!({"error": "method_not_allowed"}))?;
        return Ok(());
    }
    log::debug!("GET {}", request.path);

    if request.path == "/health" {
        return write_json_response(&mut stream, 200, &json!({"status": "ok"}));
    }
    if request.path == "/trains" {
        return match sources.list_trains() {
            Ok(listing) => write_json_response(&mut stream, 200, &listing),
            Err(err) => {
                log::warn!("/trains: {:#}", err);
                write_json_response(&mut stream, 500, &json!({"error": format!("{err:#}")}))
            }
        };
    }
    if let Some(id) = train_status_id(&request.path) {
        let id = match percent_decode(id) {
            Ok(id) => id,
            Err(err) => {
                return write_json_response(
                    &mut stream,
                    400,
                    &json!({"error": format!("{err:#}")}),
                )
            }
        };
        return match sources.train_status(&id) {
            Ok(TrainStatus::Found(train)) => write_json_response(&mut stream, 200, &train),
            Ok(TrainStatus::NotFound) => {
                write_json_response(&mut stream, 404, &json!({"error": "Train not found"}))
            }
            Ok(TrainStatus::NoDataSource) => write_json_response(
                &mut stream,
                404,
                &json!({"error": format!("No data files found ({})", sources.describe())}),
            ),
            Err(err) => {
                log::warn!("/train/{}/status: {:#}", id, err);
                write_json_response(&mut stream, 500, &json!({"error": format!("{err:#}")}))
            }
        };
    }

    if let Some(dir) = &cfg.static_dir {
        if let Some(file) = static_file(dir, &request.path) {
            let (status, content_type, body) = static_response(&file, &request.path)?;
            return write_response(&mut stream, status, content_type, &body);
        }
    }
    write_json_response(&mut stream, 404, &json!({"error": "not_found"}))
}

/// `/train/{id}/status` -> `{id}` (still percent-encoded).
fn train_status_id(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/train/")?;
    let id = rest.strip_suffix("/status")?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id)
}

/// Path segments keep `+` literal; only `%XX` escapes are decoded.
fn percent_decode(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .map_err(|_| anyhow!("path segment '{}' is not valid UTF-8", raw))
}

/// Resolve a request path inside `root`; `..` and absolute components are refused.
fn static_file(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let relative = if relative.is_empty() {
        "index.html"
    } else {
        relative
    };
    let relative = Path::new(relative);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let candidate = root.join(relative);
    candidate.is_file().then_some(candidate)
}

/// File contents, or a 500 JSON error body when the file cannot be read.
fn static_response(file: &Path, request_path: &str) -> Result<(u16, &'static str, Vec<u8>)> {
    match std::fs::read(file) {
        Ok(body) => Ok((200, content_type(file), body)),
        Err(err) => {
            log::warn!("{}: {}", file.display(), err);
            let body = serde_json::to_vec(&json!({"error": format!("failed to read {}", request_path)}))?;
            Ok((500, "application/json", body))
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &Value) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
