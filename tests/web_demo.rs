use anyhow::Result;
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};

use wheat_detector::config::WebSettings;
use wheat_detector::pipeline::SharedBackend;
use wheat_detector::web::{DetectorProvider, WebHandle, WebServer};
use wheat_detector::{FixedBackend, RawDetections, WheatDetector, NO_DETECTIONS_MESSAGE};

fn jpeg_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(96, 64, Rgb([110, 150, 70]));
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&img)
        .expect("encode jpeg");
    out
}

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

struct TestServer {
    handle: Option<WebHandle>,
}

impl TestServer {
    fn start(backend: FixedBackend, max_upload_bytes: usize) -> Result<Self> {
        Self::start_shared(Arc::new(Mutex::new(backend)), max_upload_bytes)
    }

    fn start_shared(backend: SharedBackend, max_upload_bytes: usize) -> Result<Self> {
        let provider: DetectorProvider = Arc::new(move || {
            Ok(WheatDetector::new(backend.clone(), 0.5)?.with_input_size(128))
        });
        let settings = WebSettings {
            addr: "127.0.0.1:0".to_string(),
            max_upload_bytes,
        };
        let handle = WebServer::new(settings, provider, 0.5).spawn()?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    fn addr(&self) -> SocketAddr {
        self.handle.as_ref().expect("server running").addr
    }

    fn send(&self, head: &str, body: &[u8]) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.addr())?;
        stream.write_all(head.as_bytes())?;
        stream.write_all(body)?;
        read_response(&mut stream)
    }

    fn get(&self, path: &str) -> Result<(String, String)> {
        self.send(
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"),
            &[],
        )
    }

    fn post(&self, path: &str, content_type: &str, body: &[u8]) -> Result<(String, String)> {
        let head = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        self.send(&head, body)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.stop();
        }
    }
}

fn multipart_body(boundary: &str, image: &[u8], confidence: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"field.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(image);
    body.extend_from_slice(
        format!(
            "\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"confidence\"\r\n\r\n{confidence}\r\n--{boundary}--\r\n"
        )
        .as_bytes(),
    );
    body
}

#[test]
fn health_and_index_page() -> Result<()> {
    let server = TestServer::start(FixedBackend::sample(), 1024 * 1024)?;

    let (headers, body) = server.get("/health")?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    assert_eq!(body, r#"{"status":"ok"}"#);

    let (headers, body) = server.get("/")?;
    assert!(headers.starts_with("HTTP/1.1 200"));
    assert!(headers.contains("text/html"));
    assert!(body.contains("WELCOME TO GLOBAL WHEAT HEAD CHALLENGE!"));
    assert!(body.contains("name=\"confidence\""));
    Ok(())
}

#[test]
fn api_detect_returns_filtered_report() -> Result<()> {
    let server = TestServer::start(FixedBackend::sample(), 1024 * 1024)?;

    let (headers, body) = server.post("/api/detect?confidence=0.8", "image/jpeg", &jpeg_bytes())?;
    assert!(headers.starts_with("HTTP/1.1 200"), "{headers}");
    let report: Value = serde_json::from_str(&body)?;
    assert_eq!(report["count"], 2);
    assert_eq!(report["image_width"], 128);
    let rows = report["results"].as_array().expect("results array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["Detected Boxes"], "120 88 70 63");
    assert!(rows[0]["Confidence%"].as_f64().unwrap_or_default() > 0.9);

    // Zero means "use the default" (0.5).
    let (_, body) = server.post("/api/detect?confidence=0", "image/jpeg", &jpeg_bytes())?;
    let report: Value = serde_json::from_str(&body)?;
    assert_eq!(report["count"], 3);
    Ok(())
}

#[test]
fn api_detect_rejects_bad_input() -> Result<()> {
    let server = TestServer::start(FixedBackend::sample(), 1024 * 1024)?;

    let (headers, body) = server.post("/api/detect", "image/png", b"\x89PNG\r\n\x1a\n")?;
    assert!(headers.starts_with("HTTP/1.1 400"), "{headers}");
    assert!(body.contains("error"));

    let (headers, _) = server.post("/api/detect?confidence=2", "image/jpeg", &jpeg_bytes())?;
    assert!(headers.starts_with("HTTP/1.1 400"), "{headers}");

    let (headers, _) = server.post("/api/detect?confidence=abc", "image/jpeg", &jpeg_bytes())?;
    assert!(headers.starts_with("HTTP/1.1 400"), "{headers}");
    Ok(())
}

#[test]
fn form_upload_renders_table() -> Result<()> {
    let server = TestServer::start(FixedBackend::sample(), 1024 * 1024)?;
    let boundary = "----wheatboundary7MA4YWxk";
    let body = multipart_body(boundary, &jpeg_bytes(), "");

    let (headers, page) = server.post(
        "/detect",
        &format!("multipart/form-data; boundary={boundary}"),
        &body,
    )?;
    assert!(headers.starts_with("HTTP/1.1 200"), "{headers}");
    assert!(page.contains("data:image/png;base64,"));
    assert!(page.contains("data:image/jpeg;base64,"));
    assert!(page.contains("<figcaption>Uploaded Image</figcaption>"));
    assert!(page.contains("<th>Detected Boxes</th><th>Confidence%</th>"));
    assert!(page.contains("<td>120 88 70 63</td>"));
    assert!(!page.contains(NO_DETECTIONS_MESSAGE));
    Ok(())
}

#[test]
fn form_upload_without_detections_shows_message() -> Result<()> {
    let server = TestServer::start(FixedBackend::new(RawDetections::empty()), 1024 * 1024)?;
    let boundary = "XyZboundary";
    let body = multipart_body(boundary, &jpeg_bytes(), "0.9");

    let (headers, page) = server.post(
        "/detect",
        &format!("multipart/form-data; boundary={boundary}"),
        &body,
    )?;
    assert!(headers.starts_with("HTTP/1.1 200"), "{headers}");
    assert!(page.contains(NO_DETECTIONS_MESSAGE));
    assert!(!page.contains("<table>"));
    Ok(())
}

#[test]
fn form_upload_requires_multipart() -> Result<()> {
    let server = TestServer::start(FixedBackend::sample(), 1024 * 1024)?;
    let (headers, page) = server.post("/detect", "image/jpeg", &jpeg_bytes())?;
    assert!(headers.starts_with("HTTP/1.1 400"), "{headers}");
    assert!(page.contains("class=\"error\""));
    Ok(())
}

#[test]
fn backend_failure_is_a_server_error() -> Result<()> {
    let backend: SharedBackend = Arc::new(Mutex::new(FixedBackend::sample()));
    let poisoner = backend.clone();
    let _ = std::thread::spawn(move || {
        let _guard = poisoner.lock().expect("lock");
        panic!("poison the backend lock");
    })
    .join();
    let server = TestServer::start_shared(backend, 1024 * 1024)?;

    let (headers, body) = server.post("/api/detect", "image/jpeg", &jpeg_bytes())?;
    assert!(headers.starts_with("HTTP/1.1 500"), "{headers}");
    assert!(body.contains("detection_failed"));

    // Bad uploads are still the caller's fault.
    let (headers, _) = server.post("/api/detect", "image/png", b"\x89PNG\r\n\x1a\n")?;
    assert!(headers.starts_with("HTTP/1.1 400"), "{headers}");
    Ok(())
}

#[test]
fn unknown_routes_and_methods() -> Result<()> {
    let server = TestServer::start(FixedBackend::sample(), 1024 * 1024)?;

    let (headers, _) = server.get("/nope")?;
    assert!(headers.starts_with("HTTP/1.1 404"), "{headers}");

    let (headers, _) = server.get("/api/detect")?;
    assert!(headers.starts_with("HTTP/1.1 405"), "{headers}");
    Ok(())
}

#[test]
fn oversized_upload_is_rejected() -> Result<()> {
    let server = TestServer::start(FixedBackend::sample(), 64)?;
    // Headers only: the server answers before reading any body.
    let head = "POST /api/detect HTTP/1.1\r\nHost: localhost\r\nContent-Type: image/jpeg\r\nContent-Length: 4096\r\n\r\n";
    let (headers, body) = server.send(head, &[])?;
    assert!(headers.starts_with("HTTP/1.1 413"), "{headers}");
    assert!(body.contains("payload_too_large"));
    Ok(())
}
