use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "roiwatch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_threshold() -> f64 {
    0.001
}

fn default_stride_secs() -> f64 {
    5.0
}

fn default_diff_cutoff() -> u8 {
    25
}

fn default_kernel_size() -> i32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_stride_secs")]
    pub stride_secs: f64,
    #[serde(default = "default_diff_cutoff")]
    pub diff_cutoff: u8,
    #[serde(default = "default_kernel_size")]
    pub kernel_size: i32,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            stride_secs: default_stride_secs(),
            diff_cutoff: default_diff_cutoff(),
            kernel_size: default_kernel_size(),
            width: None,
            height: None,
        }
    }
}

impl AnalysisConfig {
    pub fn analysis_size(&self) -> Option<(i32, i32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

fn default_selector_width() -> i32 {
    1280
}

fn default_selector_height() -> i32 {
    720
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoiConfig {
    #[serde(default)]
    pub points: Vec<[i32; 2]>,
    #[serde(default)]
    pub reference_width: Option<i32>,
    #[serde(default)]
    pub reference_height: Option<i32>,
    #[serde(default = "default_selector_width")]
    pub selector_width: i32,
    #[serde(default = "default_selector_height")]
    pub selector_height: i32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            reference_width: None,
            reference_height: None,
            selector_width: default_selector_width(),
            selector_height: default_selector_height(),
        }
    }
}

impl RoiConfig {
    pub fn reference_size(&self) -> Option<(i32, i32)> {
        match (self.reference_width, self.reference_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

fn default_events_path() -> String {
    "motion_events.txt".to_string()
}

fn default_partial_path() -> String {
    "motion_events_partial.txt".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_events_path")]
    pub events_path: String,
    #[serde(default = "default_partial_path")]
    pub partial_path: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            events_path: default_events_path(),
            partial_path: default_partial_path(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub roi: RoiConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load_from(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let analysis = &self.analysis;

        if !analysis.threshold.is_finite() || analysis.threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold must be a non-negative number, got {}",
                analysis.threshold
            )));
        }
        if !analysis.stride_secs.is_finite() || analysis.stride_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "stride_secs must be positive, got {}",
                analysis.stride_secs
            )));
        }
        if analysis.kernel_size < 1 || analysis.kernel_size % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "kernel_size must be odd and at least 1, got {}",
                analysis.kernel_size
            )));
        }
        match (analysis.width, analysis.height) {
            (Some(w), Some(h)) if w <= 0 || h <= 0 => {
                return Err(ConfigError::Invalid(format!(
                    "analysis size must be positive, got {w}x{h}"
                )));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::Invalid(
                    "analysis width and height must be set together".into(),
                ));
            }
            _ => {}
        }
        if self.roi.selector_width <= 0 || self.roi.selector_height <= 0 {
            return Err(ConfigError::Invalid("selector size must be positive".into()));
        }

        Ok(())
    }
}
