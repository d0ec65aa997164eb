//! Single-page web demo.
//!
//! One listener, one worker thread, one request at a time:
//! - `GET /`: upload form
//! - `POST /detect`: `multipart/form-data` upload, returns the result page
//! - `POST /api/detect?confidence=x`: raw JPEG body, returns the JSON report
//! - `GET /health`: liveness

pub mod multipart;
pub mod page;

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::WebSettings;
use crate::pipeline::{is_rejected_input, parse_threshold, WheatDetector};
use crate::render::encode_png;

const MAX_HEADER_BYTES: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Hands out a ready detector per request.
///
/// Lets the binary route every request through the model cache so an expired
/// model is reloaded transparently.
pub type DetectorProvider = Arc<dyn Fn() -> Result<WheatDetector> + Send + Sync>;

#[derive(Debug)]
pub struct WebHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl WebHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("web server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct WebServer {
    cfg: WebSettings,
    provider: DetectorProvider,
    default_threshold: f32,
}

impl WebServer {
    pub fn new(cfg: WebSettings, provider: DetectorProvider, default_threshold: f32) -> Self {
        Self {
            cfg,
            provider,
            default_threshold,
        }
    }

    pub fn spawn(self) -> Result<WebHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid web address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = self.run(listener, shutdown_thread) {
                log::error!("web server stopped: {:#}", err);
            }
        });

        Ok(WebHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }

    fn run(&self, listener: TcpListener, shutdown: Arc<AtomicBool>) -> Result<()> {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(err) = self.handle_connection(stream) {
                        log::warn!("request from {} failed: {:#}", peer, err);
                    }
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

    fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        let request = match read_request(&mut stream, self.cfg.max_upload_bytes)? {
            ReadOutcome::Request(request) => request,
            ReadOutcome::TooLarge(len) => {
                log::warn!("rejecting {} byte upload", len);
                return write_json_response(&mut stream, 413, r#"{"error":"payload_too_large"}"#);
            }
        };
        log::info!("{} {}", request.method, request.path);

        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
            ("GET", "/") => {
                let body = page::index_page(self.default_threshold);
                write_response(&mut stream, 200, "text/html; charset=utf-8", body.as_bytes())
            }
            ("POST", "/detect") => self.handle_form(&mut stream, &request),
            ("POST", "/api/detect") => self.handle_api(&mut stream, &request),
            (_, "/" | "/health" | "/detect" | "/api/detect") => {
                write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)
            }
            _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
        }
    }

    fn handle_form(&self, stream: &mut TcpStream, request: &HttpRequest) -> Result<()> {
        let html_error = |stream: &mut TcpStream, status: u16, message: &str| {
            let body = page::error_page(message, self.default_threshold);
            write_response(stream, status, "text/html; charset=utf-8", body.as_bytes())
        };

        let boundary = match request
            .header("content-type")
            .and_then(multipart::boundary_from_content_type)
        {
            Some(boundary) => boundary,
            None => return html_error(stream, 400, "Expected a multipart/form-data upload."),
        };
        let parts = match multipart::parse_multipart(&request.body, &boundary) {
            Ok(parts) => parts,
            Err(err) => return html_error(stream, 400, &format!("Malformed upload: {err}")),
        };

        let image = parts.iter().find(|part| part.name == "image");
        let Some(image) = image.filter(|part| !part.data.is_empty()) else {
            return html_error(stream, 400, "Please choose an image to upload.");
        };
        let confidence = parts
            .iter()
            .find(|part| part.name == "confidence")
            .map(|part| String::from_utf8_lossy(&part.data).into_owned());
        let threshold = match parse_threshold(confidence.as_deref()) {
            Ok(threshold) => threshold,
            Err(err) => return html_error(stream, 400, &err.to_string()),
        };

        let detector = match (self.provider)() {
            Ok(detector) => detector,
            Err(err) => {
                log::error!("model unavailable: {:#}", err);
                return html_error(stream, 500, "The detection model is unavailable.");
            }
        };
        let outcome = match detector.detect_upload(image.file_name.as_deref(), &image.data, threshold)
        {
            Ok(outcome) => outcome,
            Err(err) if is_rejected_input(&err) => {
                return html_error(stream, 400, &format!("{err:#}"));
            }
            Err(err) => {
                log::error!("detection failed: {:#}", err);
                return html_error(stream, 500, "Detection failed.");
            }
        };

        let png = encode_png(&outcome.annotated)?;
        let body = page::result_page(
            &image.data,
            &png,
            &outcome.table,
            outcome.threshold,
            detector.default_threshold(),
        );
        write_response(stream, 200, "text/html; charset=utf-8", body.as_bytes())
    }

    fn handle_api(&self, stream: &mut TcpStream, request: &HttpRequest) -> Result<()> {
        let threshold = match parse_threshold(request.query.get("confidence").map(String::as_str))
        {
            Ok(threshold) => threshold,
            Err(err) => return write_error_json(stream, 400, &err.to_string()),
        };
        let detector = match (self.provider)() {
            Ok(detector) => detector,
            Err(err) => {
                log::error!("model unavailable: {:#}", err);
                return write_error_json(stream, 500, "model_unavailable");
            }
        };
        match detector.detect_upload(None, &request.body, threshold) {
            Ok(outcome) => {
                let payload = serde_json::to_vec(&outcome.report())?;
                write_response(stream, 200, "application/json", &payload)
            }
            Err(err) if is_rejected_input(&err) => write_error_json(stream, 400, &format!("{err:#}")),
            Err(err) => {
                log::error!("detection failed: {:#}", err);
                write_error_json(stream, 500, "detection_failed")
            }
        }
    }
}

enum ReadOutcome {
    Request(HttpRequest),
    TooLarge(usize),
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

fn read_request(stream: &mut TcpStream, max_body: usize) -> Result<ReadOutcome> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(idx) = multipart::find(&data, b"\r\n\r\n", 0) {
            break idx;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > max_body {
        return Ok(ReadOutcome::TooLarge(content_length));
    }

    let mut body = data[header_end + 4..].to_vec();
    body.truncate(content_length);
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!(
                "connection closed after {} of {} body bytes",
                body.len(),
                content_length
            ));
        }
        let take = n.min(content_length - body.len());
        body.extend_from_slice(&buf[..take]);
    }

    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (raw_path, ""),
    };
    let query = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    Ok(ReadOutcome::Request(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        query,
        headers,
        body,
    }))
}

fn write_error_json(stream: &mut TcpStream, status: u16, message: &str) -> Result<()> {
    let payload = serde_json::to_vec(&serde_json::json!({ "error": message }))?;
    write_response(stream, status, "application/json", &payload)
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
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
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}
