//! Configuration management for tpswarp

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A 2D point in pixel coordinates (x = column, y = row)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Parses `x,y` as given on the command line
impl FromStr for Point {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected `x,y`, got `{}`", s))?;
        let x = x
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid x coordinate `{}`: {}", x.trim(), e))?;
        let y = y
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid y coordinate `{}`: {}", y.trim(), e))?;
        Ok(Point::new(x, y))
    }
}

/// Checkerboard target settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerboardConfig {
    pub squares_x: u32,
    pub squares_y: u32,
    pub square_px: u32,
    pub output: PathBuf,
}

impl Default for CheckerboardConfig {
    fn default() -> Self {
        Self {
            squares_x: 9,
            squares_y: 17,
            square_px: 100,
            output: PathBuf::from("data/reference_shirt/checkerboard.png"),
        }
    }
}

/// Color-cube map settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorMapConfig {
    /// Number of levels per RGB channel
    pub steps_per_dim: u32,
    /// Cube axis sliced into tiles (0, 1 or 2)
    pub split_dim: usize,
    /// Number of bands the tile strip is folded into
    pub square_rows: u32,
    pub square_px: u32,
    pub output: PathBuf,
}

impl Default for ColorMapConfig {
    fn default() -> Self {
        Self {
            steps_per_dim: 12,
            split_dim: 2,
            square_rows: 4,
            square_px: 25,
            output: PathBuf::from("data/reference_shirt/color_map.png"),
        }
    }
}

/// Thin-plate spline warp job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarpConfig {
    pub input: PathBuf,
    pub output: PathBuf,

    /// Control point positions in the source image
    pub start: Vec<Point>,

    /// Where each start point ends up in the output image
    pub end: Vec<Point>,

    /// Border anchor points per side; 0 or 1 disables pinning
    #[serde(default = "default_pin_points")]
    pub pin_points: usize,

    /// Never sample source row 0 (legacy warp behavior)
    #[serde(default)]
    pub legacy_bounds: bool,
}

fn default_pin_points() -> usize {
    5
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/img/head.jpg"),
            output: PathBuf::from("data/img/head_warped.jpg"),
            start: vec![
                Point::new(970.0, 700.0),
                Point::new(870.0, 160.0),
                Point::new(420.0, 570.0),
            ],
            end: vec![
                Point::new(860.0, 600.0),
                Point::new(1050.0, 120.0),
                Point::new(350.0, 760.0),
            ],
            pin_points: default_pin_points(),
            legacy_bounds: false,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub checkerboard: CheckerboardConfig,

    #[serde(default)]
    pub color_map: ColorMapConfig,

    #[serde(default)]
    pub warp: WarpConfig,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
