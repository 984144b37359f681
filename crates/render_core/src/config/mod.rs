//! # Renderer Configuration
//!
//! File-backed configuration for the resource and swapchain layer. Files are
//! loaded by extension: `.toml` through `toml`, `.ron` through `ron`.

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(path, &contents)
    }

    /// Parse configuration text, choosing the format from the path's extension
    fn parse(path: &str, contents: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Serialize configuration in the format matching the path's extension
    fn render(&self, path: &str) -> Result<String, ConfigError> {
        if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = self.render(path)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Window creation parameters for the windowed backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial client width in screen coordinates
    pub width: u32,
    /// Initial client height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "render_core".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// # Renderer Configuration
///
/// Application metadata, frame pacing and device-selection knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Number of frames the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers (`None` = debug builds only)
    pub enable_validation: Option<bool>,
    /// Prefer the low-latency mailbox present mode when the surface offers it
    pub prefer_mailbox: bool,
    /// Upper bound for the MSAA sample count picked from the device
    pub max_msaa_samples: u32,
    /// Window parameters (windowed backend only)
    pub window: WindowConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            frames_in_flight: 2,
            enable_validation: None,
            prefer_mailbox: true,
            max_msaa_samples: 64,
            window: WindowConfig::default(),
        }
    }

    /// Set application version
    pub const fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set number of frames in flight
    pub const fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Cap the MSAA sample count
    pub const fn with_max_msaa_samples(mut self, samples: u32) -> Self {
        self.max_msaa_samples = samples;
        self
    }

    /// Set window parameters
    pub fn with_window(mut self, title: impl Into<String>, width: u32, height: u32) -> Self {
        self.window = WindowConfig {
            title: title.into(),
            width,
            height,
        };
        self
    }

    /// Resolved validation setting
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if !(1..=8).contains(&self.frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "Frames in flight must be between 1 and 8, got {}",
                self.frames_in_flight
            )));
        }

        if !self.max_msaa_samples.is_power_of_two() || self.max_msaa_samples > 64 {
            return Err(ConfigError::Invalid(format!(
                "MSAA sample cap must be a power of two no larger than 64, got {}",
                self.max_msaa_samples
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid("Window size must be non-zero".to_string()));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("render_core application")
    }
}

impl Config for RendererConfig {}
