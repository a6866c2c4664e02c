use crate::device::DeviceMode;
use crate::renderer::Rgb;
use crate::spring::{self, SpringConfig};
use crate::stars::StarConfig;
use log::warn;
use serde::Deserialize;
use std::fs;

/// Top-level configuration for HyprStars
#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub starfield: StarfieldConfig,

    #[serde(default)]
    pub noise: NoiseConfig,
}

/// General daemon settings
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Target frame rate for the animation loop (default: 60)
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Device classification: "auto", "mobile" or "desktop"
    #[serde(default)]
    pub device: DeviceMode,

    /// User agent string fed to device classification
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Output (monitor) to draw on; the first one when unset
    pub output: Option<String>,

    /// Color behind every layer
    #[serde(default = "default_background")]
    pub background: String,

    /// Effects to stack, bottom first
    #[serde(default = "default_layers")]
    pub layers: Vec<String>,
}

/// Parallax starfield settings
#[derive(Debug, Deserialize, Clone)]
pub struct StarfieldConfig {
    /// Stars per square pixel (default: 0.00015)
    #[serde(default = "default_density")]
    pub density: f64,

    /// Make every star twinkle instead of a random subset
    #[serde(default = "default_true")]
    pub all_twinkle: bool,

    /// Chance a star twinkles when `all_twinkle` is off
    #[serde(default = "default_twinkle_probability")]
    pub twinkle_probability: f32,

    #[serde(default = "default_min_twinkle_speed")]
    pub min_twinkle_speed: f32,

    #[serde(default = "default_max_twinkle_speed")]
    pub max_twinkle_speed: f32,

    /// Pointer parallax multiplier (default: 0.05)
    #[serde(default = "default_parallax_intensity")]
    pub parallax_intensity: f32,

    /// Star color
    #[serde(default = "default_white")]
    pub color: String,

    /// Fixed RNG seed; a fresh random field each run when unset
    pub seed: Option<u64>,

    /// Unset fields keep the pointer spring's own defaults
    #[serde(default = "SpringConfig::pointer", deserialize_with = "spring::pointer_spring")]
    pub pointer_spring: SpringConfig,

    /// Unset fields keep the scroll spring's own defaults
    #[serde(default = "SpringConfig::scroll", deserialize_with = "spring::scroll_spring")]
    pub scroll_spring: SpringConfig,
}

/// Tiled noise overlay settings
#[derive(Debug, Deserialize, Clone)]
pub struct NoiseConfig {
    /// Color the noise is modulated from
    #[serde(default = "default_white")]
    pub color: String,

    /// Overlay opacity (0.0 - 1.0, default: 0.15)
    #[serde(default = "default_noise_opacity")]
    pub opacity: f32,

    pub seed: Option<u64>,
}

// Default value functions
fn default_fps() -> u32 {
    60
}
fn default_user_agent() -> String {
    format!("hyprstars/{} (Wayland; Linux)", env!("CARGO_PKG_VERSION"))
}
fn default_background() -> String {
    "#000000".to_string()
}
fn default_layers() -> Vec<String> {
    vec!["starfield".to_string(), "noise".to_string()]
}
fn default_density() -> f64 {
    0.00015
}
fn default_true() -> bool {
    true
}
fn default_twinkle_probability() -> f32 {
    0.7
}
fn default_min_twinkle_speed() -> f32 {
    0.5
}
fn default_max_twinkle_speed() -> f32 {
    1.0
}
fn default_parallax_intensity() -> f32 {
    0.05
}
fn default_white() -> String {
    "#ffffff".to_string()
}
fn default_noise_opacity() -> f32 {
    0.15
}

/// Densities above this many stars per square pixel are clamped to it
const MAX_DENSITY: f64 = 0.01;

/// Parse a color option, falling back (with a warning) when it is malformed
pub fn color_or(value: &str, fallback: Rgb, field: &str) -> Rgb {
    Rgb::from_hex(value).unwrap_or_else(|| {
        warn!("Invalid color {:?} for {}, using default", value, field);
        fallback
    })
}

impl GeneralConfig {
    pub fn background_rgb(&self) -> Rgb {
        color_or(&self.background, Rgb::BLACK, "general.background")
    }

    /// Frame interval in milliseconds, with fps clamped to 1..=240
    pub fn frame_interval_ms(&self) -> u64 {
        1000 / self.fps.clamp(1, 240) as u64
    }
}

impl StarfieldConfig {
    pub fn star_config(&self) -> StarConfig {
        StarConfig {
            density: self.density_or_default(),
            all_twinkle: self.all_twinkle,
            twinkle_probability: self.twinkle_probability.clamp(0.0, 1.0),
            min_twinkle_speed: self.min_twinkle_speed,
            max_twinkle_speed: self.max_twinkle_speed,
        }
    }

    pub fn color_rgb(&self) -> Rgb {
        color_or(&self.color, Rgb::WHITE, "starfield.color")
    }

    fn density_or_default(&self) -> f64 {
        if !self.density.is_finite() {
            warn!("Invalid starfield.density {}, using default", self.density);
            return default_density();
        }
        if self.density > MAX_DENSITY {
            warn!("starfield.density {} is too high, clamping to {}", self.density, MAX_DENSITY);
            return MAX_DENSITY;
        }
        self.density.max(0.0)
    }
}

impl NoiseConfig {
    pub fn color_rgb(&self) -> Rgb {
        color_or(&self.color, Rgb::WHITE, "noise.color")
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            device: DeviceMode::Auto,
            user_agent: default_user_agent(),
            output: None,
            background: default_background(),
            layers: default_layers(),
        }
    }
}

impl Default for StarfieldConfig {
    fn default() -> Self {
        Self {
            density: default_density(),
            all_twinkle: true,
            twinkle_probability: default_twinkle_probability(),
            min_twinkle_speed: default_min_twinkle_speed(),
            max_twinkle_speed: default_max_twinkle_speed(),
            parallax_intensity: default_parallax_intensity(),
            color: default_white(),
            seed: None,
            pointer_spring: SpringConfig::pointer(),
            scroll_spring: SpringConfig::scroll(),
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            color: default_white(),
            opacity: default_noise_opacity(),
            seed: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.general.fps, 60);
        assert_eq!(config.general.device, DeviceMode::Auto);
        assert_eq!(config.general.layers, vec!["starfield", "noise"]);
        assert_eq!(config.starfield.star_config(), StarConfig::default());
        assert_eq!(config.starfield.pointer_spring, SpringConfig::pointer());
        assert_eq!(config.starfield.scroll_spring, SpringConfig::scroll());
        assert_eq!(config.noise.color_rgb(), Rgb::WHITE);
        assert_eq!(config.general.background_rgb(), Rgb::BLACK);
        assert_eq!(config.starfield.parallax_intensity, 0.05);
    }

    #[test]
    fn explicit_starfield_config() {
        let config: Config = toml::from_str(
            r##"
            [general]
            fps = 30
            device = "mobile"
            layers = ["starfield"]

            [starfield]
            density = 0.0003
            all_twinkle = false
            twinkle_probability = 1.5
            parallax_intensity = 0.08
            color = "#abc"
            seed = 7

            [starfield.scroll_spring]
            stiffness = 120.0
            "##,
        )
        .unwrap();
        assert_eq!(config.general.fps, 30);
        assert_eq!(config.general.frame_interval_ms(), 33);
        assert_eq!(config.general.device, DeviceMode::Mobile);
        assert_eq!(config.general.layers, vec!["starfield"]);

        let stars = config.starfield.star_config();
        assert_eq!(stars.density, 0.0003);
        assert!(!stars.all_twinkle);
        assert_eq!(stars.twinkle_probability, 1.0);
        assert_eq!(config.starfield.color_rgb(), Rgb::new(0xaa, 0xbb, 0xcc));
        assert_eq!(config.starfield.seed, Some(7));
        assert_eq!(config.starfield.parallax_intensity, 0.08);
        // Partially specified springs fill the rest from their own defaults
        assert_eq!(config.starfield.scroll_spring.stiffness, 120.0);
        assert_eq!(config.starfield.scroll_spring.damping, 25.0);
        assert_eq!(config.starfield.scroll_spring.mass, 1.0);
        assert_eq!(config.starfield.pointer_spring, SpringConfig::pointer());
    }

    #[test]
    fn malformed_colors_fall_back() {
        let config: Config = toml::from_str(
            r##"
            [general]
            background = "midnight"

            [noise]
            color = "#12"
            "##,
        )
        .unwrap();
        assert_eq!(config.general.background_rgb(), Rgb::BLACK);
        assert_eq!(config.noise.color_rgb(), Rgb::WHITE);
    }

    #[test]
    fn runaway_density_is_clamped() {
        let config: Config = toml::from_str("[starfield]\ndensity = 1e15").unwrap();
        assert_eq!(config.starfield.star_config().density, MAX_DENSITY);

        let config: Config = toml::from_str("[starfield]\ndensity = inf").unwrap();
        assert_eq!(config.starfield.star_config().density, default_density());

        let config: Config = toml::from_str("[starfield]\ndensity = -1.0").unwrap();
        assert_eq!(config.starfield.star_config().density, 0.0);
    }

    #[test]
    fn fps_is_clamped() {
        let config: Config = toml::from_str("[general]\nfps = 0").unwrap();
        assert_eq!(config.general.frame_interval_ms(), 1000);
    }
}
