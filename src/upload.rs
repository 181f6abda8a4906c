//! The single image a detection is run against.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use image::ImageFormat;

use crate::error::DetectionError;

const FALLBACK_MIME: &str = "application/octet-stream";

/// An accepted image file held in memory.
///
/// Only the declared MIME type is checked; the bytes are sent as-is.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    bytes: Vec<u8>,
    mime_type: String,
    filename: String,
}

impl Upload {
    /// Accept a file, rejecting anything whose MIME type is not `image/*`.
    pub fn new(
        bytes: Vec<u8>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Result<Self, DetectionError> {
        let declared = mime_type.into();
        let mime_type = declared.trim();
        if !is_image_mime(mime_type) || mime_type.chars().any(char::is_control) {
            return Err(DetectionError::InvalidFileType(declared));
        }
        let mime_type = mime_type.to_string();
        Ok(Self {
            bytes,
            mime_type,
            filename: filename.into(),
        })
    }

    /// Read a file from disk, deriving its MIME type from the extension.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let mime_type = mime_for_path(path);
        if !is_image_mime(mime_type) {
            return Err(DetectionError::InvalidFileType(mime_type.to_string()).into());
        }
        let bytes =
            std::fs::read(path).with_context(|| format!("read image {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(bytes, filename, mime_type)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.trim().to_ascii_lowercase().starts_with("image/")
}

/// MIME type for a path based on its extension only.
pub fn mime_for_path(path: &Path) -> &'static str {
    if let Ok(format) = ImageFormat::from_path(path) {
        return format.to_mime_type();
    }
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        "txt" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => FALLBACK_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn accepts_any_image_mime() {
        let upload = Upload::new(vec![1, 2, 3], "scene.tif", "image/tiff").unwrap();
        assert_eq!(upload.mime_type(), "image/tiff");
        assert_eq!(upload.filename(), "scene.tif");
        assert_eq!(upload.len(), 3);
        assert!(Upload::new(vec![], "x", "IMAGE/PNG").is_ok());
    }

    #[test]
    fn rejects_non_image_mime() {
        let err = Upload::new(b"hello".to_vec(), "notes.txt", "text/plain").unwrap_err();
        assert_eq!(err, DetectionError::InvalidFileType("text/plain".to_string()));
    }

    #[test]
    fn declared_mime_is_trimmed_and_single_line() {
        let upload = Upload::new(vec![1], "pass.png", " image/png \n").unwrap();
        assert_eq!(upload.mime_type(), "image/png");

        let injected = "image/png\r\nX-Injected: 1";
        assert_eq!(
            Upload::new(vec![1], "pass.png", injected).unwrap_err(),
            DetectionError::InvalidFileType(injected.to_string())
        );
    }

    #[test]
    fn mime_comes_from_extension() {
        assert_eq!(mime_for_path(&PathBuf::from("a/b/pass.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(&PathBuf::from("pass.png")), "image/png");
        assert_eq!(mime_for_path(&PathBuf::from("report.pdf")), "application/pdf");
        assert_eq!(mime_for_path(&PathBuf::from("no_extension")), FALLBACK_MIME);
    }

    #[test]
    fn from_path_rejects_before_reading() {
        // The file does not exist; rejection must happen on the extension alone.
        let err = Upload::from_path(Path::new("/nonexistent/readme.txt")).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DetectionError>(),
            Some(&DetectionError::InvalidFileType("text/plain".to_string()))
        );
    }
}
