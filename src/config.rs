use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub overlay: OverlayConfig,

    #[serde(default)]
    pub preview: PreviewConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Capture device index as reported by the platform backend.
    #[serde(default)]
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Download URL overrides, keyed by artifact key. Artifacts without an
    /// entry use their published location.
    #[serde(default)]
    pub urls: BTreeMap<String, String>,

    /// Local cache for downloaded weights.
    #[serde(default = "default_models_dir")]
    pub dir: PathBuf,

    /// Optional hex SHA-256 per artifact, keyed by artifact key
    /// (`detector`, `landmarks`, `recognition`, `expressions`).
    #[serde(default)]
    pub sha256: BTreeMap<String, String>,
}

fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("moodcam/models")
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            urls: BTreeMap::new(),
            dir: default_models_dir(),
            sha256: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Period of the detection timer in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    100
}

impl DetectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// TrueType font for labels. Common system fonts are tried when unset.
    #[serde(default)]
    pub font_path: Option<PathBuf>,

    #[serde(default = "default_min_font_px")]
    pub min_font_px: f32,

    /// Label size is display width divided by this.
    #[serde(default = "default_font_divisor")]
    pub font_divisor: f32,

    #[serde(default = "default_line_width")]
    pub line_width: u32,
}

fn default_min_font_px() -> f32 {
    12.0
}

fn default_font_divisor() -> f32 {
    50.0
}

fn default_line_width() -> u32 {
    2
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            min_font_px: default_min_font_px(),
            font_divisor: default_font_divisor(),
            line_width: default_line_width(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageProtocol {
    #[default]
    Auto,
    Sixel,
    Kitty,
    ITerm2,
    Halfblocks,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default)]
    pub protocol: ImageProtocol,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Directory `snapshot.png` is written to.
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,
}

fn default_snapshot_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

impl SnapshotConfig {
    pub fn path(&self) -> PathBuf {
        self.dir.join("snapshot.png")
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = match std::env::var_os("MOODCAM_CONFIG") {
            Some(path) => PathBuf::from(path),
            None => Self::config_path(),
        };

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.detection.interval_ms == 0 {
            bail!("detection.interval_ms must be greater than zero");
        }
        if self.overlay.font_divisor <= 0.0 {
            bail!("overlay.font_divisor must be positive");
        }
        if self.overlay.line_width == 0 {
            bail!("overlay.line_width must be at least 1");
        }
        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("moodcam")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
