//! `multipart/form-data` encoding for the predict request, and the matching
//! decoder used by the stub service.

use anyhow::{anyhow, Result};
use rand::RngCore;

const MAX_PARTS: usize = 64;

/// Incrementally built multipart body.
#[derive(Debug)]
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        let suffix: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self::with_boundary(format!("----wavetrack{}", suffix))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn add_text(&mut self, name: &str, value: &str) {
        self.open_part();
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                escape_quoted(name)
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
    }

    pub fn add_file(&mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) {
        self.open_part();
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                escape_quoted(name),
                escape_quoted(filename),
                content_type.replace(['\r', '\n'], "")
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
    }

    /// Close the body. Returns the `Content-Type` header value and the bytes.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        let content_type = self.content_type();
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (content_type, self.body)
    }

    fn open_part(&mut self) {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }
}

// Same escaping browsers apply to field names and filenames.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// One decoded form field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FormPart {
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// Extract the boundary parameter from a `multipart/form-data` content type.
pub fn boundary_from_content_type(content_type: &str) -> Result<String> {
    let mut params = content_type.split(';');
    let media_type = params.next().unwrap_or("").trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return Err(anyhow!(
            "expected multipart/form-data, got '{}'",
            media_type
        ));
    }
    params
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
        .ok_or_else(|| anyhow!("multipart content type missing boundary"))
}

/// Decode a complete multipart body.
pub fn parse_form_data(content_type: &str, body: &[u8]) -> Result<Vec<FormPart>> {
    let boundary = boundary_from_content_type(content_type)?;
    let delimiter = format!("--{}", boundary).into_bytes();
    let next_delimiter = format!("\r\n--{}", boundary).into_bytes();

    let mut pos = find(body, &delimiter, 0)
        .ok_or_else(|| anyhow!("multipart body missing opening boundary"))?
        + delimiter.len();
    let mut parts = Vec::new();
    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            break;
        }
        if !rest.starts_with(b"\r\n") {
            return Err(anyhow!("malformed multipart boundary line"));
        }
        pos += 2;
        let end = find(body, &next_delimiter, pos)
            .ok_or_else(|| anyhow!("unterminated multipart part"))?;
        parts.push(parse_part(&body[pos..end])?);
        if parts.len() > MAX_PARTS {
            return Err(anyhow!("too many multipart parts"));
        }
        pos = end + next_delimiter.len();
    }
    Ok(parts)
}

fn parse_part(raw: &[u8]) -> Result<FormPart> {
    let header_end =
        find(raw, b"\r\n\r\n", 0).ok_or_else(|| anyhow!("multipart part missing headers"))?;
    let headers = String::from_utf8_lossy(&raw[..header_end]);
    let data = raw[header_end + 4..].to_vec();

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                for (k, v) in header_params(value) {
                    match k.as_str() {
                        "name" => name = Some(v),
                        "filename" => filename = Some(v),
                        _ => {}
                    }
                }
            }
            "content-type" => content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Ok(FormPart {
        name: name.ok_or_else(|| anyhow!("multipart part missing name"))?,
        filename,
        content_type,
        data,
    })
}

/// `key=value` parameters after the first `;` of a header value.
///
/// Quoted values may contain `;` and `=`. Keys are lowercased.
fn header_params(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut segment = String::new();
    let mut in_quotes = false;
    let mut chars = value.chars();
    // Skip the disposition type.
    for c in chars.by_ref() {
        if c == ';' {
            break;
        }
    }
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                segment.push(c);
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    segment.push(escaped);
                }
            }
            ';' if !in_quotes => {
                push_param(&mut params, &segment);
                segment.clear();
            }
            _ => segment.push(c),
        }
    }
    push_param(&mut params, &segment);
    params
}

fn push_param(params: &mut Vec<(String, String)>, segment: &str) {
    if let Some((k, v)) = segment.trim().split_once('=') {
        let v = v.trim();
        let v = v
            .strip_prefix('"')
            .and_then(|inner| inner.strip_suffix('"'))
            .unwrap_or(v);
        params.push((k.trim().to_ascii_lowercase(), v.to_string()));
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_text_and_file_parts() {
        let mut body = MultipartBody::with_boundary("XyZ");
        body.add_file("file", "scene.png", "image/png", b"\x89PNG");
        body.add_text("options", "Número de Barcos");
        let (content_type, bytes) = body.finish();

        assert_eq!(content_type, "multipart/form-data; boundary=XyZ");
        let mut expected = Vec::new();
        expected.extend_from_slice(
            b"--XyZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scene.png\"\r\nContent-Type: image/png\r\n\r\n\x89PNG\r\n",
        );
        expected.extend_from_slice(
            "--XyZ\r\nContent-Disposition: form-data; name=\"options\"\r\n\r\nNúmero de Barcos\r\n--XyZ--\r\n"
                .as_bytes(),
        );
        assert_eq!(bytes, expected);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let mut body = MultipartBody::new();
        // Binary payload containing CRLF sequences and dashes.
        let payload = b"\xff\xd8\r\n--not-a-boundary\r\n\xff\xd9".to_vec();
        body.add_file("file", "we\"ird.jpg", "image/jpeg", &payload);
        body.add_text("options", "Imagen con Detecciones");
        body.add_text("options", "Probabilidades de Detección");
        let (content_type, bytes) = body.finish();

        let parts = parse_form_data(&content_type, &bytes).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].name, "file");
        assert_eq!(parts[0].filename.as_deref(), Some("we%22ird.jpg"));
        assert_eq!(parts[0].content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(parts[0].data, payload);
        assert_eq!(parts[1].text(), Some("Imagen con Detecciones"));
        assert_eq!(parts[2].text(), Some("Probabilidades de Detección"));
    }

    #[test]
    fn quoted_filename_keeps_separators() {
        let mut body = MultipartBody::new();
        body.add_file("file", "pass;2024=vv.png", "image/png", b"\x89PNG");
        let (content_type, bytes) = body.finish();

        let parts = parse_form_data(&content_type, &bytes).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, "file");
        assert_eq!(parts[0].filename.as_deref(), Some("pass;2024=vv.png"));
        assert_eq!(parts[0].content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn file_content_type_stays_on_one_line() {
        let mut body = MultipartBody::with_boundary("b");
        body.add_file("file", "x.png", "image/png\r\nX-Injected: 1", b"x");
        let (content_type, bytes) = body.finish();

        let parts = parse_form_data(&content_type, &bytes).unwrap();
        assert_eq!(parts[0].content_type.as_deref(), Some("image/pngX-Injected: 1"));
        assert!(!String::from_utf8_lossy(&bytes).contains("\r\nX-Injected"));
    }

    #[test]
    fn disposition_params_allow_escaped_quotes() {
        assert_eq!(
            header_params(r#" form-data; NAME="file"; filename="a\"b;c.png""#),
            vec![
                ("name".to_string(), "file".to_string()),
                ("filename".to_string(), "a\"b;c.png".to_string()),
            ]
        );
    }

    #[test]
    fn boundary_parameter_may_be_quoted() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; charset=utf-8; boundary=\"abc\"")
                .unwrap(),
            "abc"
        );
        assert!(boundary_from_content_type("application/json").is_err());
        assert!(boundary_from_content_type("multipart/form-data").is_err());
    }

    #[test]
    fn rejects_truncated_body() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"file\"\r\n\r\nabc";
        assert!(parse_form_data("multipart/form-data; boundary=b", body).is_err());
    }
}
