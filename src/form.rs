//! Detection form state.
//!
//! Holds the selected upload, the output flags and the outcome of the most
//! recent submission. Lifecycle: `Idle -> Submitting -> (Succeeded | Failed)`,
//! and the next accepted submission starts over from `Submitting`.

use std::path::Path;

use crate::client::InferenceService;
use crate::error::DetectionError;
use crate::options::{DetectionOption, OutputOptions};
use crate::response::DetectionResult;
use crate::upload::Upload;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormPhase {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// Snapshot of what is being sent, taken when the gate passes.
#[derive(Clone, Debug)]
pub struct Submission {
    pub upload: Upload,
    pub options: Vec<DetectionOption>,
}

#[derive(Debug, Default)]
pub struct DetectionForm {
    upload: Option<Upload>,
    options: OutputOptions,
    phase: FormPhase,
    result: Option<DetectionResult>,
    failure: Option<DetectionError>,
}

impl DetectionForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: OutputOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// File-picker selection. A rejected file leaves the current upload in place.
    pub fn select_file(
        &mut self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<&Upload, DetectionError> {
        let upload = Upload::new(bytes, filename, mime_type)?;
        Ok(self.replace_upload(upload))
    }

    /// File-picker selection from disk.
    pub fn select_path(&mut self, path: &Path) -> anyhow::Result<&Upload> {
        let upload = Upload::from_path(path)?;
        Ok(self.replace_upload(upload))
    }

    /// Drag-and-drop selection. Non-image drops are ignored without an error.
    pub fn drop_file(&mut self, bytes: Vec<u8>, filename: &str, mime_type: &str) -> Option<&Upload> {
        match Upload::new(bytes, filename, mime_type) {
            Ok(upload) => Some(self.replace_upload(upload)),
            Err(err) => {
                log::debug!("ignoring dropped file {}: {}", filename, err);
                None
            }
        }
    }

    fn replace_upload(&mut self, upload: Upload) -> &Upload {
        log::info!(
            "image selected: {} ({}, {} bytes)",
            upload.filename(),
            upload.mime_type(),
            upload.len()
        );
        self.upload.insert(upload)
    }

    pub fn upload(&self) -> Option<&Upload> {
        self.upload.as_ref()
    }

    pub fn options(&self) -> OutputOptions {
        self.options
    }

    pub fn set_option(&mut self, option: DetectionOption, enabled: bool) {
        self.options.set(option, enabled);
    }

    pub fn toggle_option(&mut self, option: DetectionOption) {
        self.options.toggle(option);
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&DetectionError> {
        self.failure.as_ref()
    }

    /// Mirrors the enabled state of the submit control.
    pub fn can_submit(&self) -> bool {
        self.upload.is_some() && self.phase != FormPhase::Submitting
    }

    /// Check the gate without changing any state.
    pub fn validate(&self) -> Result<Submission, DetectionError> {
        let upload = self.upload.as_ref().ok_or(DetectionError::NoImage)?;
        if self.options.is_empty() {
            return Err(DetectionError::NoOutputSelected);
        }
        Ok(Submission {
            upload: upload.clone(),
            options: self.options.selected(),
        })
    }

    /// Pass the gate and enter `Submitting`, clearing any previous outcome.
    ///
    /// Validation failures leave the phase and previous result untouched.
    pub fn begin(&mut self) -> Result<Submission, DetectionError> {
        if self.phase == FormPhase::Submitting {
            return Err(DetectionError::Busy);
        }
        let submission = self.validate()?;
        self.result = None;
        self.failure = None;
        self.phase = FormPhase::Submitting;
        Ok(submission)
    }

    /// Record the outcome of the outstanding submission.
    pub fn complete(
        &mut self,
        outcome: Result<DetectionResult, DetectionError>,
    ) -> Result<&DetectionResult, DetectionError> {
        match outcome {
            Ok(result) => {
                self.phase = FormPhase::Succeeded;
                let result: &DetectionResult = self.result.insert(result);
                Ok(result)
            }
            Err(err) => {
                log::warn!("detection failed: {}", err);
                self.phase = FormPhase::Failed;
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Gate, call the service once, and record the outcome.
    pub fn submit<S: InferenceService>(
        &mut self,
        service: &S,
    ) -> Result<&DetectionResult, DetectionError> {
        let submission = self.begin()?;
        log::info!(
            "submitting {} with options [{}]",
            submission.upload.filename(),
            submission
                .options
                .iter()
                .map(|option| option.cli_name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let outcome = service
            .predict(&submission.upload, &submission.options)
            .map_err(|err| DetectionError::remote(format!("{:#}", err)))
            .and_then(|response| response.into_result());
        self.complete(outcome)
    }
}
