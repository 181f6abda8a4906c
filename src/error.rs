/// Errors surfaced to the person running a detection.
///
/// There are two kinds. Validation errors are raised synchronously before
/// any network activity. `Remote` covers everything that can go wrong once
/// the request has been issued; the message is the only detail kept.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// Submit was attempted before an image was selected.
    #[error("no image uploaded")]
    NoImage,

    /// Submit was attempted with every output flag cleared.
    #[error("no output selected")]
    NoOutputSelected,

    /// The selected file does not carry an `image/*` MIME type.
    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    /// A submission is already outstanding.
    #[error("a detection request is already in progress")]
    Busy,

    /// The inference service call failed or reported an error.
    #[error("{0}")]
    Remote(String),
}

/// Fallback text when a remote failure carries no usable message.
pub const GENERIC_REMOTE_FAILURE: &str = "detection request failed";

impl DetectionError {
    /// Build a remote failure, falling back to a generic message for blank text.
    pub fn remote(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            DetectionError::Remote(GENERIC_REMOTE_FAILURE.to_string())
        } else {
            DetectionError::Remote(message)
        }
    }

    /// True for errors raised before any network call.
    pub fn is_validation(&self) -> bool {
        !matches!(self, DetectionError::Remote(_))
    }

    /// Short headline for the notice shown to the user.
    pub fn title(&self) -> &'static str {
        match self {
            DetectionError::NoImage => "No image uploaded",
            DetectionError::NoOutputSelected => "No output selected",
            DetectionError::InvalidFileType(_) => "Invalid file type",
            DetectionError::Busy => "Analysis in progress",
            DetectionError::Remote(_) => "Analysis failed",
        }
    }

    /// Longer explanation for the notice shown to the user.
    pub fn description(&self) -> String {
        match self {
            DetectionError::NoImage => "Please upload a SAR image first".to_string(),
            DetectionError::NoOutputSelected => {
                "Please select at least one output option".to_string()
            }
            DetectionError::InvalidFileType(_) => "Please upload an image file".to_string(),
            DetectionError::Busy => "Wait for the current analysis to finish".to_string(),
            DetectionError::Remote(message) => message.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_remote_message_uses_fallback() {
        assert_eq!(
            DetectionError::remote("  "),
            DetectionError::Remote(GENERIC_REMOTE_FAILURE.to_string())
        );
        assert_eq!(
            DetectionError::remote("model not loaded").description(),
            "model not loaded"
        );
    }

    #[test]
    fn only_remote_failures_are_not_validation() {
        assert!(DetectionError::NoImage.is_validation());
        assert!(DetectionError::NoOutputSelected.is_validation());
        assert!(DetectionError::InvalidFileType("text/plain".into()).is_validation());
        assert!(!DetectionError::remote("boom").is_validation());
    }
}
