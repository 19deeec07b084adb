use rollcall_core::distance::{
    CALIBRATION_DISTANCE_CM, DISTANCE_TOLERANCE_CM, OPTIMAL_DISTANCE_CM, REFERENCE_FACE_HEIGHT_CM,
};
use rollcall_core::{DistanceEstimator, MatchMetric, ThresholdMatcher};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file used when neither `--config` nor `ROLLCALL_CONFIG` is given.
pub const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("duplicate student name in roster: {0}")]
    DuplicateStudent(String),
    #[error("roster is empty")]
    EmptyRoster,
    #[error("camera.detect_downscale must be at least 1")]
    InvalidDownscale,
}

/// Session configuration, loaded from `rollcall.toml` with `ROLLCALL_*` overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Spreadsheet holding the attendance rows (`.xlsx` or `.csv`).
    pub attendance_file: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    pub camera: CameraConfig,
    pub distance: DistanceConfig,
    pub matching: MatchingConfig,
    pub display: DisplayConfig,
    pub mail: MailConfig,
    /// Roster, in the order students are listed and reported.
    pub students: Vec<StudentEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// V4L2 device path.
    pub device: String,
    /// Frames discarded at startup while auto-exposure settles.
    pub warmup_frames: usize,
    /// Integer factor frames are shrunk by before detection.
    pub detect_downscale: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    pub reference_height_cm: f32,
    pub calibration_distance_cm: f32,
    /// Offline-calibrated focal length in pixels.
    pub focal_length_px: Option<f32>,
    pub optimal_cm: i32,
    pub tolerance_cm: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Maximum embedding distance for a match, measured with `metric`.
    pub tolerance: f32,
    /// `cosine` (default) or `euclidean`.
    pub metric: MatchMetric,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    /// TrueType font for overlay labels. Boxes are still drawn without one.
    pub font: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub sender: String,
    /// Prefer `ROLLCALL_SMTP_PASSWORD` over storing this in the file.
    pub password: String,
}

/// One roster entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StudentEntry {
    pub name: String,
    pub email: String,
    /// Reference photo used to build the face template.
    pub image: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attendance_file: PathBuf::from("attendance.xlsx"),
            model_dir: rollcall_core::default_model_dir(),
            camera: CameraConfig::default(),
            distance: DistanceConfig::default(),
            matching: MatchingConfig::default(),
            display: DisplayConfig::default(),
            mail: MailConfig::default(),
            students: Vec::new(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            warmup_frames: 4,
            detect_downscale: 4,
        }
    }
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            reference_height_cm: REFERENCE_FACE_HEIGHT_CM,
            calibration_distance_cm: CALIBRATION_DISTANCE_CM,
            focal_length_px: None,
            optimal_cm: OPTIMAL_DISTANCE_CM,
            tolerance_cm: DISTANCE_TOLERANCE_CM,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tolerance: rollcall_core::catalog::DEFAULT_MATCH_TOLERANCE,
            metric: MatchMetric::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            font: None,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender: String::new(),
            password: String::new(),
        }
    }
}

impl Config {
    /// Load from `path`, else `ROLLCALL_CONFIG`, else `./rollcall.toml`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("ROLLCALL_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.apply_env();
        config.validate()?;

        tracing::debug!(path = %path.display(), students = config.students.len(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `ROLLCALL_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_string("ROLLCALL_CAMERA_DEVICE") {
            self.camera.device = v;
        }
        if let Some(v) = env_string("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = env_string("ROLLCALL_ATTENDANCE_FILE") {
            self.attendance_file = PathBuf::from(v);
        }
        if let Some(v) = env_string("ROLLCALL_SMTP_PASSWORD") {
            self.mail.password = v;
        }
        self.matching.tolerance = env_f32("ROLLCALL_MATCH_TOLERANCE", self.matching.tolerance);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.students.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        if self.camera.detect_downscale == 0 {
            return Err(ConfigError::InvalidDownscale);
        }
        let mut seen = HashSet::new();
        for student in &self.students {
            if !seen.insert(student.name.as_str()) {
                return Err(ConfigError::DuplicateStudent(student.name.clone()));
            }
        }
        Ok(())
    }

    pub fn estimator(&self) -> DistanceEstimator {
        DistanceEstimator {
            reference_height_cm: self.distance.reference_height_cm,
            calibration_distance_cm: self.distance.calibration_distance_cm,
            focal_length_px: self.distance.focal_length_px,
            optimal_cm: self.distance.optimal_cm,
            tolerance_cm: self.distance.tolerance_cm,
        }
    }

    pub fn matcher(&self) -> ThresholdMatcher {
        ThresholdMatcher {
            tolerance: self.matching.tolerance,
            metric: self.matching.metric,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::ARCFACE_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
