//! Local stand-in for the inference service.
//!
//! Serves `POST /predict/` with the same multipart request and JSON response
//! shapes as the real service, so the client can be exercised without a
//! model. Results are derived deterministically from the uploaded bytes.
//! Every request that reaches the predict route is recorded.

use anyhow::{anyhow, Result};
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::client::{FILE_FIELD, OPTIONS_FIELD, PREDICT_PATH};
use crate::multipart::parse_form_data;
use crate::options::DetectionOption;
use crate::response::PredictResponse;

const MAX_HEADER_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;
const MAX_SHIPS: u64 = 15;
const PLACEHOLDER_SIZE: u32 = 256;

/// How the stub answers predict requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StubBehavior {
    /// Produce detections for the requested options.
    #[default]
    Detect,
    /// Answer 200 with only an `error` field.
    ReportError(String),
    /// Answer with this status and a non-JSON body.
    FailStatus(u16),
}

#[derive(Clone, Debug)]
pub struct StubConfig {
    pub addr: String,
    pub behavior: StubBehavior,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            behavior: StubBehavior::Detect,
        }
    }
}

/// What the stub saw in one predict request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedRequest {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub file_len: usize,
    /// Raw `options` values in the order they were sent.
    pub options: Vec<String>,
}

#[derive(Debug)]
pub struct StubHandle {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StubHandle {
    /// Base URL to hand to the client.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Result<Vec<ReceivedRequest>> {
        let requests = self
            .requests
            .lock()
            .map_err(|_| anyhow!("stub request log lock poisoned"))?;
        Ok(requests.clone())
    }

    pub fn request_count(&self) -> Result<usize> {
        let requests = self
            .requests
            .lock()
            .map_err(|_| anyhow!("stub request log lock poisoned"))?;
        Ok(requests.len())
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stub server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct StubServer {
    cfg: StubConfig,
}

impl StubServer {
    pub fn new(cfg: StubConfig) -> Self {
        Self { cfg }
    }

    pub fn spawn(self) -> Result<StubHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let requests_thread = requests.clone();
        let shutdown_thread = shutdown.clone();
        let behavior = self.cfg.behavior.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_stub(listener, behavior, requests_thread, shutdown_thread) {
                log::error!("predict stub stopped: {}", err);
            }
        });

        Ok(StubHandle {
            addr,
            requests,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_stub(
    listener: TcpListener,
    behavior: StubBehavior,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &behavior, &requests) {
                    log::warn!("predict stub request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    behavior: &StubBehavior,
    requests: &Mutex<Vec<ReceivedRequest>>,
) -> Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode.
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;

    let is_predict = request.path == PREDICT_PATH || request.path == "/predict";
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            return write_json_response(&mut stream, 200, r#"{"status":"ok"}"#);
        }
        ("POST", _) if is_predict => {}
        (_, _) if is_predict => {
            return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
        }
        _ => {
            return write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#);
        }
    }

    let content_type = request
        .headers
        .get("content-type")
        .cloned()
        .unwrap_or_default();
    let parts = match parse_form_data(&content_type, &request.body) {
        Ok(parts) => parts,
        Err(err) => {
            let body = serde_json::json!({ "error": err.to_string() }).to_string();
            write_json_response(&mut stream, 422, &body)?;
            return Err(err);
        }
    };

    let file = parts.iter().find(|part| part.name == FILE_FIELD);
    let options: Vec<String> = parts
        .iter()
        .filter(|part| part.name == OPTIONS_FIELD)
        .map(|part| String::from_utf8_lossy(&part.data).into_owned())
        .collect();
    requests
        .lock()
        .map_err(|_| anyhow!("stub request log lock poisoned"))?
        .push(ReceivedRequest {
            filename: file.and_then(|f| f.filename.clone()),
            content_type: file.and_then(|f| f.content_type.clone()),
            file_len: file.map(|f| f.data.len()).unwrap_or(0),
            options: options.clone(),
        });
    let Some(file) = file else {
        return write_json_response(&mut stream, 422, r#"{"error":"file field is required"}"#);
    };

    match behavior {
        StubBehavior::Detect => {}
        StubBehavior::ReportError(message) => {
            let body = serde_json::to_string(&PredictResponse {
                error: Some(message.clone()),
                ..PredictResponse::default()
            })?;
            return write_json_response(&mut stream, 200, &body);
        }
        StubBehavior::FailStatus(code) => {
            return write_response(&mut stream, *code, "text/plain", b"stub configured to fail");
        }
    }

    let requested: Vec<DetectionOption> = options
        .iter()
        .filter_map(|label| {
            let option = DetectionOption::from_wire_label(label);
            if option.is_none() {
                log::warn!("predict stub ignoring unknown option '{}'", label);
            }
            option
        })
        .collect();
    let response = synthesize_response(&file.data, &requested)?;
    let body = serde_json::to_vec(&response)?;
    log::info!(
        "predict stub answered {} ({} options)",
        file.filename.as_deref().unwrap_or("<unnamed>"),
        requested.len()
    );
    write_response(&mut stream, 200, "application/json", &body)
}

/// Deterministic fake detections for an image.
pub fn synthesize_response(
    image_bytes: &[u8],
    requested: &[DetectionOption],
) -> Result<PredictResponse> {
    let mut rng = StdRng::seed_from_u64(image_seed(image_bytes)?);
    let count = rng.gen_range(1..=MAX_SHIPS);
    let mut response = PredictResponse::default();
    if requested.contains(&DetectionOption::ShipCount) {
        response.count_result = Some(count);
    }
    if requested.contains(&DetectionOption::DetectionProbability) {
        let values = (0..count)
            .map(|_| (rng.gen_range(0.6..1.0_f64) * 100.0).round() / 100.0)
            .collect();
        response.probabilities_result = Some(values);
    }
    if requested.contains(&DetectionOption::ProcessedImage) {
        let jpeg = annotate(image_bytes, count, &mut rng)?;
        response.image_result = Some(base64::engine::general_purpose::STANDARD.encode(jpeg));
    }
    Ok(response)
}

fn annotate(image_bytes: &[u8], count: u64, rng: &mut StdRng) -> Result<Vec<u8>> {
    let mut canvas = match image::load_from_memory(image_bytes) {
        Ok(img) => img.to_rgb8(),
        Err(_) => RgbImage::from_pixel(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, Rgb([24, 32, 48])),
    };
    let (width, height) = canvas.dimensions();
    for _ in 0..count {
        let w = (width / 10).max(4);
        let h = (height / 10).max(4);
        let x = rng.gen_range(0..width.saturating_sub(w).max(1));
        let y = rng.gen_range(0..height.saturating_sub(h).max(1));
        draw_box(&mut canvas, x, y, w, h, Rgb([255, 64, 64]));
    }
    let mut out = Cursor::new(Vec::new());
    canvas.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

fn draw_box(canvas: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    let x1 = (x + w).min(width.saturating_sub(1));
    let y1 = (y + h).min(height.saturating_sub(1));
    for px in x..=x1 {
        canvas.put_pixel(px, y, color);
        canvas.put_pixel(px, y1, color);
    }
    for py in y..=y1 {
        canvas.put_pixel(x, py, color);
        canvas.put_pixel(x1, py, color);
    }
}

/// RNG seed taken from the image digest, so identical uploads get identical detections.
fn image_seed(image_bytes: &[u8]) -> Result<u64> {
    let digest = Sha256::digest(image_bytes);
    Ok(u64::from_le_bytes(digest[..8].try_into()?))
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
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

    let content_length: usize = match headers.get("content-length") {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(anyhow!("request body too large"));
    }
    let mut body = data.split_off(header_end + 4);
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
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
    let header = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n",
        status = status,
        reason = reason_phrase(status),
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Error",
    }
}
