//! Overlay configuration.
//!
//! The on-disk file is partial: any section or field may be omitted.  It is
//! deserialized into [`PartialConfig`] and folded over the defaults with
//! [`Config::merge`], so a user file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use super::platform;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Text styling for renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// `#RRGGBB` for title and surrounding lyric lines.
    #[serde(default = "default_text_color")]
    pub text_color: String,
    /// `#RRGGBB` for the current lyric line.
    #[serde(default = "default_highlight_color")]
    pub highlight_color: String,
}

/// Optional display elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_true")]
    pub show_cd: bool,
    #[serde(default = "default_true")]
    pub show_progress: bool,
    #[serde(default = "default_true")]
    pub show_timecode: bool,
}

/// Listener for "now playing" notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory searched for `.lrc` files.
    #[serde(default = "default_lyrics_dir")]
    pub lyrics_dir: PathBuf,
    /// Directory holding the cached cover image.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Image shown when a track arrives without cover art.
    #[serde(default = "default_cover")]
    pub default_cover: PathBuf,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            font_family: default_font_family(),
            font_size: default_font_size(),
            text_color: default_text_color(),
            highlight_color: default_highlight_color(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            show_cd: true,
            show_progress: true,
            show_timecode: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            lyrics_dir: default_lyrics_dir(),
            cache_dir: default_cache_dir(),
            default_cover: default_cover(),
        }
    }
}

fn default_font_family() -> String {
    "Microsoft YaHei".to_string()
}

fn default_font_size() -> u32 {
    22
}

fn default_text_color() -> String {
    "#FFFFFF".to_string()
}

fn default_highlight_color() -> String {
    "#00AEEF".to_string()
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5005
}

fn default_lyrics_dir() -> PathBuf {
    platform::data_dir().join("lyrics")
}

fn default_cache_dir() -> PathBuf {
    platform::cache_dir()
}

fn default_cover() -> PathBuf {
    platform::data_dir().join("cd_default.png")
}

// ── Partial (user file) schema ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub ui: Option<PartialUi>,
    #[serde(default)]
    pub features: Option<PartialFeatures>,
    #[serde(default)]
    pub server: Option<PartialServer>,
    #[serde(default)]
    pub paths: Option<PartialPaths>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialUi {
    pub font_family: Option<String>,
    pub font_size: Option<u32>,
    pub text_color: Option<String>,
    pub highlight_color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialFeatures {
    pub show_cd: Option<bool>,
    pub show_progress: Option<bool>,
    pub show_timecode: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialServer {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialPaths {
    pub lyrics_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub default_cover: Option<PathBuf>,
}

/// Immutable styling and toggles handed to a renderer when settings are
/// applied.  Renderers keep their own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOptions {
    pub ui: UiConfig,
    pub features: FeatureConfig,
    pub default_cover: PathBuf,
}

impl Config {
    /// Overlay every field present in `over` onto `self`.
    pub fn merge(mut self, over: PartialConfig) -> Self {
        if let Some(ui) = over.ui {
            set(&mut self.ui.font_family, ui.font_family);
            set(&mut self.ui.font_size, ui.font_size);
            set(&mut self.ui.text_color, ui.text_color);
            set(&mut self.ui.highlight_color, ui.highlight_color);
        }
        if let Some(features) = over.features {
            set(&mut self.features.show_cd, features.show_cd);
            set(&mut self.features.show_progress, features.show_progress);
            set(&mut self.features.show_timecode, features.show_timecode);
        }
        if let Some(server) = over.server {
            set(&mut self.server.host, server.host);
            set(&mut self.server.port, server.port);
        }
        if let Some(paths) = over.paths {
            set(&mut self.paths.lyrics_dir, paths.lyrics_dir);
            set(&mut self.paths.cache_dir, paths.cache_dir);
            set(&mut self.paths.default_cover, paths.default_cover);
        }
        self
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let partial: PartialConfig = toml::from_str(content)?;
        Ok(Self::default().merge(partial))
    }

    /// Load the user config merged over defaults.  A missing file is created
    /// with the defaults; an unreadable one is reported and ignored.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        match Self::from_toml_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Ignoring invalid config {:?}: {}", config_path, e);
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Create the lyric and cache directories if they do not exist yet.
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.paths.lyrics_dir)?;
        std::fs::create_dir_all(&self.paths.cache_dir)?;
        Ok(())
    }

    pub fn cover_cache_path(&self) -> PathBuf {
        self.paths.cache_dir.join(platform::COVER_FILE_NAME)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            ui: self.ui.clone(),
            features: self.features.clone(),
            default_cover: self.paths.default_cover.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ui: UiConfig::default(),
            features: FeatureConfig::default(),
            server: ServerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}
