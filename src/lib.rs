//! WaveTrack ship detection client
//!
//! This crate submits SAR (Synthetic Aperture Radar) images to a remote ship
//! detection service and renders what it returns. Detection itself happens
//! entirely in the service; this side owns input handling, request
//! validation, the HTTP exchange and presentation.
//!
//! # Flow
//!
//! 1. **Upload**: a single image is accepted by MIME type (`image/*` only).
//! 2. **Options**: three independent flags select ship count, detection
//!    probabilities and the annotated image.
//! 3. **Gate**: nothing is sent without an image and at least one flag.
//! 4. **Call**: one multipart `POST /predict/`, one JSON response.
//! 5. **Render**: each returned field becomes one output block.
//!
//! # Module Structure
//!
//! - `upload`, `options`: the form inputs
//! - `form`: the submission gate and `idle -> submitting -> done` state
//! - `client`, `multipart`, `response`: the remote inference call
//! - `render`: terminal output and annotated image saving
//! - `config`: file and environment configuration
//! - `stub`: a local stand-in for the inference service

pub mod client;
pub mod config;
pub mod error;
pub mod form;
pub mod multipart;
pub mod options;
pub mod render;
pub mod response;
pub mod stub;
pub mod upload;

pub use client::{HttpInferenceClient, InferenceService};
pub use config::ClientConfig;
pub use error::DetectionError;
pub use form::{DetectionForm, FormPhase, Submission};
pub use options::{DetectionOption, OutputOptions};
pub use render::{Report, ResultBlock};
pub use response::{DetectionResult, PredictResponse};
pub use stub::{StubBehavior, StubConfig, StubHandle, StubServer};
pub use upload::Upload;
