//! Detection output options.
//!
//! Each option is an independent toggle asking the inference service for one
//! result field. The wire labels are fixed by the service and must be sent
//! verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionOption {
    /// Number of ships (`count_result`).
    ShipCount,
    /// Per-ship confidence values (`probabilities_result`).
    DetectionProbability,
    /// Annotated image with detections drawn (`image_result`).
    ProcessedImage,
}

impl DetectionOption {
    pub const ALL: [DetectionOption; 3] = [
        DetectionOption::ShipCount,
        DetectionOption::DetectionProbability,
        DetectionOption::ProcessedImage,
    ];

    /// Value sent in the `options` multipart field.
    pub fn wire_label(self) -> &'static str {
        match self {
            DetectionOption::ShipCount => "Número de Barcos",
            DetectionOption::DetectionProbability => "Probabilidades de Detección",
            DetectionOption::ProcessedImage => "Imagen con Detecciones",
        }
    }

    pub fn display_label(self) -> &'static str {
        match self {
            DetectionOption::ShipCount => "Number of Ships",
            DetectionOption::DetectionProbability => "Detection Probability",
            DetectionOption::ProcessedImage => "Processed Image",
        }
    }

    /// Short name accepted on the command line and in config files.
    pub fn cli_name(self) -> &'static str {
        match self {
            DetectionOption::ShipCount => "count",
            DetectionOption::DetectionProbability => "probabilities",
            DetectionOption::ProcessedImage => "image",
        }
    }

    pub fn from_wire_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|option| option.wire_label() == label)
    }
}

impl fmt::Display for DetectionOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_label())
    }
}

impl FromStr for DetectionOption {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "count" | "ship-count" | "ships" => Ok(DetectionOption::ShipCount),
            "probabilities" | "probability" | "confidence" => {
                Ok(DetectionOption::DetectionProbability)
            }
            "image" | "processed-image" | "annotated" => Ok(DetectionOption::ProcessedImage),
            other => Err(anyhow::anyhow!(
                "unknown detection option '{}'; expected count, probabilities or image",
                other
            )),
        }
    }
}

/// The three output flags tracked by the form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
    pub ship_count: bool,
    pub detection_probability: bool,
    pub processed_image: bool,
}

impl OutputOptions {
    pub fn all() -> Self {
        Self {
            ship_count: true,
            detection_probability: true,
            processed_image: true,
        }
    }

    pub fn from_selection<I: IntoIterator<Item = DetectionOption>>(options: I) -> Self {
        let mut out = Self::default();
        for option in options {
            out.set(option, true);
        }
        out
    }

    pub fn is_set(&self, option: DetectionOption) -> bool {
        match option {
            DetectionOption::ShipCount => self.ship_count,
            DetectionOption::DetectionProbability => self.detection_probability,
            DetectionOption::ProcessedImage => self.processed_image,
        }
    }

    pub fn set(&mut self, option: DetectionOption, enabled: bool) {
        match option {
            DetectionOption::ShipCount => self.ship_count = enabled,
            DetectionOption::DetectionProbability => self.detection_probability = enabled,
            DetectionOption::ProcessedImage => self.processed_image = enabled,
        }
    }

    pub fn toggle(&mut self, option: DetectionOption) {
        let current = self.is_set(option);
        self.set(option, !current);
    }

    pub fn is_empty(&self) -> bool {
        !(self.ship_count || self.detection_probability || self.processed_image)
    }

    /// Selected options in fixed order.
    pub fn selected(&self) -> Vec<DetectionOption> {
        DetectionOption::ALL
            .into_iter()
            .filter(|option| self.is_set(*option))
            .collect()
    }
}

/// Parse a comma separated list of option names.
pub fn parse_option_list(value: &str) -> anyhow::Result<Vec<DetectionOption>> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(DetectionOption::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_labels_match_service_contract() {
        assert_eq!(DetectionOption::ShipCount.wire_label(), "Número de Barcos");
        assert_eq!(
            DetectionOption::DetectionProbability.wire_label(),
            "Probabilidades de Detección"
        );
        assert_eq!(
            DetectionOption::ProcessedImage.wire_label(),
            "Imagen con Detecciones"
        );
        assert_eq!(
            DetectionOption::from_wire_label("Imagen con Detecciones"),
            Some(DetectionOption::ProcessedImage)
        );
        assert_eq!(DetectionOption::from_wire_label("Numero de Barcos"), None);
    }

    #[test]
    fn flags_are_independent() {
        let mut options = OutputOptions::default();
        assert!(options.is_empty());

        options.toggle(DetectionOption::ProcessedImage);
        options.set(DetectionOption::ShipCount, true);
        assert_eq!(
            options.selected(),
            vec![DetectionOption::ShipCount, DetectionOption::ProcessedImage]
        );

        options.toggle(DetectionOption::ShipCount);
        assert_eq!(options.selected(), vec![DetectionOption::ProcessedImage]);
        assert!(!options.is_empty());
    }

    #[test]
    fn parses_cli_option_lists() {
        let parsed = parse_option_list("image, count,,").unwrap();
        assert_eq!(
            parsed,
            vec![DetectionOption::ProcessedImage, DetectionOption::ShipCount]
        );
        assert!(parse_option_list("count,heatmap").is_err());
        assert_eq!(
            OutputOptions::from_selection(parsed).selected(),
            vec![DetectionOption::ShipCount, DetectionOption::ProcessedImage]
        );
    }
}
