//! wavetrack - run SAR ship detection on one image via the inference service
//!
//! This tool:
//! 1. Accepts one image (rejected up front unless its type is image/*)
//! 2. Requests the selected outputs from `POST /predict/`
//! 3. Prints the count and probabilities, and saves the annotated image

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use wavetrack::{
    ClientConfig, DetectionError, DetectionForm, DetectionOption, HttpInferenceClient,
    OutputOptions, Report,
};

#[path = "../ui.rs"]
mod ui;

use ui::NoticeKind;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect ships in a SAR image using the WaveTrack inference service"
)]
struct Args {
    /// SAR image to analyse.
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Base URL of the inference service (overrides config and WAVETRACK_ENDPOINT).
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Request the number of ships.
    #[arg(long)]
    count: bool,

    /// Request per-ship detection probabilities.
    #[arg(long)]
    probabilities: bool,

    /// Request the processed image with detections drawn.
    #[arg(long, visible_alias = "image")]
    processed_image: bool,

    /// Request every output.
    #[arg(long, conflicts_with_all = ["count", "probabilities", "processed_image"])]
    all: bool,

    /// Where to write the processed image.
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print results as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    /// Options chosen on the command line, if any were.
    fn requested_options(&self) -> Option<OutputOptions> {
        if self.all {
            return Some(OutputOptions::all());
        }
        let mut options = OutputOptions::default();
        options.set(DetectionOption::ShipCount, self.count);
        options.set(DetectionOption::DetectionProbability, self.probabilities);
        options.set(DetectionOption::ProcessedImage, self.processed_image);
        (!options.is_empty()).then_some(options)
    }
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal(), args.json);

    let mut config = ClientConfig::load()?;
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(output) = &args.output {
        config.image_path = output.clone();
    }
    let client = HttpInferenceClient::new(&config.endpoint)?;
    log::info!("inference service: {}", client.url());

    let options = args.requested_options().unwrap_or(config.default_options);
    let mut form = DetectionForm::with_options(options);

    if let Err(err) = form.select_path(&args.image) {
        return match err.downcast::<DetectionError>() {
            Ok(rejected) => Ok(report_failure(&ui, &rejected)),
            Err(other) => Err(other),
        };
    }
    ui.notice(
        NoticeKind::Info,
        "Image uploaded successfully",
        "SAR image ready for analysis",
    );

    if let Err(err) = form.validate() {
        return Ok(report_failure(&ui, &err));
    }

    let outcome = {
        let stage = ui.stage("Analyzing");
        let outcome = form.submit(&client).cloned();
        if outcome.is_ok() {
            stage.succeed();
        }
        outcome
    };
    let result = match outcome {
        Ok(result) => result,
        Err(err) => return Ok(report_failure(&ui, &err)),
    };
    ui.notice(
        NoticeKind::Info,
        "Analysis complete",
        "Ship detection analysis finished successfully",
    );

    let saved = wavetrack::render::save_annotated_image(&result, &config.image_path)?;
    let report = Report::from_result(&result, saved.as_deref());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let stdout = std::io::stdout();
        report.write_text(&mut stdout.lock())?;
    }
    Ok(ExitCode::SUCCESS)
}

fn report_failure(ui: &ui::Ui, err: &DetectionError) -> ExitCode {
    ui.notice(NoticeKind::Error, err.title(), &err.description());
    ExitCode::FAILURE
}
