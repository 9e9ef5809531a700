use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub vlm: VlmConfig,
    #[serde(default)]
    pub gallery: GalleryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VideoConfig {
    /// Camera index ("0"), video file path, or rtsp:// URL
    #[serde(default = "default_video_source")]
    pub source: String,
    /// Requested capture width (webcams only)
    #[serde(default)]
    pub width: Option<u32>,
    /// Requested capture height (webcams only)
    #[serde(default)]
    pub height: Option<u32>,
}

fn default_video_source() -> String { "0".to_string() }

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            source: default_video_source(),
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// Square model input edge in pixels
    #[serde(default = "default_input_size")]
    pub input_size: i32,
    /// Minimum person score
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// IoU above which overlapping detections are merged
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    /// Keypoints below this confidence are treated as undetected
    #[serde(default = "default_keypoint_confidence")]
    pub keypoint_confidence: f32,
    /// Fraction of the frame width that inference runs on, centered
    #[serde(default = "default_center_fraction")]
    pub center_fraction: f32,
}

fn default_model_path() -> String { "models/yolo11s-pose.onnx".to_string() }
fn default_input_size() -> i32 { 640 }
fn default_confidence_threshold() -> f32 { 0.5 }
fn default_iou_threshold() -> f32 { 0.45 }
fn default_keypoint_confidence() -> f32 { 0.3 }
fn default_center_fraction() -> f32 { 0.5 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            input_size: default_input_size(),
            confidence_threshold: default_confidence_threshold(),
            iou_threshold: default_iou_threshold(),
            keypoint_confidence: default_keypoint_confidence(),
            center_fraction: default_center_fraction(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    /// Lowest acceptable wrist position, percent of shoulder-hip range
    #[serde(default = "default_vertical_min")]
    pub vertical_min_percent: f32,
    /// Highest acceptable wrist position, percent of shoulder-hip range
    #[serde(default = "default_vertical_max")]
    pub vertical_max_percent: f32,
    /// Maximum shoulder width, percent of shoulder-hip range
    #[serde(default = "default_max_shoulder")]
    pub max_shoulder_percent: f32,
    /// Which wrists must pass: "left", "right" or "both"
    #[serde(default = "default_wrist")]
    pub wrist: String,
    /// Also require the wrist to sit between the shoulders horizontally
    #[serde(default)]
    pub require_horizontal_bound: bool,
}

fn default_vertical_min() -> f32 { -20.0 }
fn default_vertical_max() -> f32 { 30.0 }
fn default_max_shoulder() -> f32 { 20.0 }
fn default_wrist() -> String { "both".to_string() }

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            vertical_min_percent: default_vertical_min(),
            vertical_max_percent: default_vertical_max(),
            max_shoulder_percent: default_max_shoulder(),
            wrist: default_wrist(),
            require_horizontal_bound: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// Folder flagged frames are written to (the VLM verifier watches it)
    #[serde(default = "default_archive_dir")]
    pub dir: String,
    #[serde(default = "default_archive_prefix")]
    pub prefix: String,
    /// Write a _results.txt diagnostic next to each frame
    #[serde(default = "default_write_sidecar")]
    pub write_sidecar: bool,
}

fn default_archive_dir() -> String { "zipping_pose".to_string() }
fn default_archive_prefix() -> String { "candidate".to_string() }
fn default_write_sidecar() -> bool { true }

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: default_archive_dir(),
            prefix: default_archive_prefix(),
            write_sidecar: default_write_sidecar(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// Show the live debug window
    #[serde(default = "default_display_enabled")]
    pub enabled: bool,
}

fn default_display_enabled() -> bool { true }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: default_display_enabled(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WriterConfig {
    /// Record the annotated stream to an mp4 file
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_writer_output")]
    pub output_path: String,
    /// Output FPS; 0 uses the source FPS (or 30 when unknown)
    #[serde(default)]
    pub fps: f64,
}

fn default_writer_output() -> String { "monitor_output.mp4".to_string() }

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_path: default_writer_output(),
            fps: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VlmConfig {
    /// Ollama-style chat endpoint
    #[serde(default = "default_vlm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_vlm_model")]
    pub model: String,
    /// Folder polled for new candidate frames
    #[serde(default = "default_archive_dir")]
    pub watch_dir: String,
    /// Parent of the conf_1..conf_5 folders
    #[serde(default = "default_sorted_root")]
    pub sorted_root: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Pause between images within a batch
    #[serde(default = "default_image_delay")]
    pub image_delay_secs: u64,
    #[serde(default = "default_vlm_timeout")]
    pub timeout_secs: u64,
}

fn default_vlm_endpoint() -> String { "http://127.0.0.1:11434/api/chat".to_string() }
fn default_vlm_model() -> String { "gemma3:latest".to_string() }
fn default_sorted_root() -> String { ".".to_string() }
fn default_poll_interval() -> u64 { 5 }
fn default_image_delay() -> u64 { 1 }
fn default_vlm_timeout() -> u64 { 120 }

impl Default for VlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vlm_endpoint(),
            model: default_vlm_model(),
            watch_dir: default_archive_dir(),
            sorted_root: default_sorted_root(),
            poll_interval_secs: default_poll_interval(),
            image_delay_secs: default_image_delay(),
            timeout_secs: default_vlm_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GalleryConfig {
    #[serde(default = "default_gallery_addr")]
    pub listen_addr: String,
    /// Parent of the conf_1..conf_5 folders served by the gallery
    #[serde(default = "default_sorted_root")]
    pub image_root: String,
    /// Session lifetime in seconds; unset means sessions never expire
    #[serde(default)]
    pub session_ttl_secs: Option<u64>,
    /// username -> password
    #[serde(default = "default_users")]
    pub users: HashMap<String, String>,
}

fn default_gallery_addr() -> String { "0.0.0.0:8000".to_string() }
fn default_users() -> HashMap<String, String> {
    HashMap::from([
        ("admin".to_string(), "admin".to_string()),
        ("user".to_string(), "password".to_string()),
        ("162395".to_string(), "162395".to_string()),
    ])
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_gallery_addr(),
            image_root: default_sorted_root(),
            session_ttl_secs: None,
            users: default_users(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))?;
        Ok(config)
    }

    /// Load the config file, falling back to defaults when it is missing.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Config {} not loaded ({:#}), using defaults",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }
}
