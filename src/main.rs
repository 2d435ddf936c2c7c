//! tpswarp - Thin-plate spline image warping and calibration targets
//!
//! Generates the reference checkerboard and color map images used to
//! calibrate printed patterns, and warps images by fitting a thin-plate
//! spline to pairs of control points.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tpswarp::calibration;
use tpswarp::config::{self, Config, Point};
use tpswarp::transform::{self, SampleBounds, TpsWarp, WarpOptions};

/// tpswarp - thin-plate spline warping and calibration targets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "tpswarp.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the checkerboard calibration image
    Checkerboard {
        /// Number of squares across
        #[arg(long)]
        squares_x: Option<u32>,

        /// Number of squares down
        #[arg(long)]
        squares_y: Option<u32>,

        /// Side of one square in pixels
        #[arg(long)]
        square_px: Option<u32>,

        /// Output image path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the RGB color-cube calibration image
    ColorMap {
        /// Levels per color channel
        #[arg(long)]
        steps: Option<u32>,

        /// Cube axis sliced into tiles (0, 1 or 2)
        #[arg(long)]
        split_dim: Option<usize>,

        /// Number of rows the tile strip is folded into
        #[arg(long)]
        rows: Option<u32>,

        /// Side of one color square in pixels
        #[arg(long)]
        square_px: Option<u32>,

        /// Output image path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Warp an image with a thin-plate spline
    Warp {
        /// Input image path
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output image path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Source position of a control point as `x,y` (repeatable)
        #[arg(long = "start", allow_hyphen_values = true)]
        start: Vec<Point>,

        /// Target position of a control point as `x,y` (repeatable)
        #[arg(long = "end", allow_hyphen_values = true)]
        end: Vec<Point>,

        /// Pin points per image side
        #[arg(long, conflicts_with = "no_pins")]
        pins: Option<usize>,

        /// Do not pin the image border
        #[arg(long)]
        no_pins: bool,

        /// Never sample source row 0 (legacy behavior)
        #[arg(long)]
        legacy_bounds: bool,

        /// Write the fitted spline coefficients as JSON
        #[arg(long)]
        coefficients: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("tpswarp v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_or_create(&args.config)?;

    match args.command {
        Command::Checkerboard {
            squares_x,
            squares_y,
            square_px,
            output,
        } => {
            let cfg = &mut config.checkerboard;
            override_with(&mut cfg.squares_x, squares_x);
            override_with(&mut cfg.squares_y, squares_y);
            override_with(&mut cfg.square_px, square_px);
            override_with(&mut cfg.output, output);
            run_checkerboard(cfg)
        }
        Command::ColorMap {
            steps,
            split_dim,
            rows,
            square_px,
            output,
        } => {
            let cfg = &mut config.color_map;
            override_with(&mut cfg.steps_per_dim, steps);
            override_with(&mut cfg.split_dim, split_dim);
            override_with(&mut cfg.square_rows, rows);
            override_with(&mut cfg.square_px, square_px);
            override_with(&mut cfg.output, output);
            run_color_map(cfg)
        }
        Command::Warp {
            input,
            output,
            start,
            end,
            pins,
            no_pins,
            legacy_bounds,
            coefficients,
        } => {
            let cfg = &mut config.warp;
            override_with(&mut cfg.input, input);
            override_with(&mut cfg.output, output);
            if !start.is_empty() || !end.is_empty() {
                cfg.start = start;
                cfg.end = end;
            }
            override_with(&mut cfg.pin_points, pins);
            if no_pins {
                cfg.pin_points = 0;
            }
            cfg.legacy_bounds |= legacy_bounds;
            run_warp(cfg, coefficients.as_deref())
        }
    }
}

/// Replace a config value with a command-line override, if given
fn override_with<T>(value: &mut T, cli: Option<T>) {
    if let Some(v) = cli {
        *value = v;
    }
}

fn run_checkerboard(cfg: &config::CheckerboardConfig) -> Result<()> {
    info!(
        "Checkerboard: {}x{} squares of {}px",
        cfg.squares_x, cfg.squares_y, cfg.square_px
    );
    let board = calibration::checkerboard(cfg.squares_x, cfg.squares_y, cfg.square_px)?;
    ensure_parent(&cfg.output)?;
    board
        .save(&cfg.output)
        .with_context(|| format!("Failed to write checkerboard to {:?}", cfg.output))?;
    info!("Wrote {:?}", cfg.output);
    Ok(())
}

fn run_color_map(cfg: &config::ColorMapConfig) -> Result<()> {
    info!(
        "Color map: {} steps per channel, split along axis {}, {} rows of {}px squares",
        cfg.steps_per_dim, cfg.split_dim, cfg.square_rows, cfg.square_px
    );
    let map = calibration::color_map(
        cfg.steps_per_dim,
        cfg.split_dim,
        cfg.square_rows,
        cfg.square_px,
    )?;
    ensure_parent(&cfg.output)?;
    map.save(&cfg.output)
        .with_context(|| format!("Failed to write color map to {:?}", cfg.output))?;
    info!("Wrote {:?}", cfg.output);
    Ok(())
}

fn run_warp(cfg: &config::WarpConfig, coefficients: Option<&Path>) -> Result<()> {
    let options = WarpOptions {
        pin_points: (cfg.pin_points >= 2).then_some(cfg.pin_points),
        bounds: if cfg.legacy_bounds {
            SampleBounds::ExcludeTopRow
        } else {
            SampleBounds::Symmetric
        },
    };

    info!("Input: {:?}", cfg.input);
    let src = transform::load_image(&cfg.input)
        .with_context(|| format!("Failed to load image {:?}", cfg.input))?;

    let warp = TpsWarp::new(&cfg.start, &cfg.end, src.width(), src.height(), options.pin_points)
        .context("Failed to fit thin-plate spline")?;
    info!(
        "Fitted {} control points ({} anchors with pins) on {}x{} image",
        cfg.start.len(),
        warp.anchor_count(),
        src.width(),
        src.height()
    );

    let warped = transform::apply_dynamic(&warp, &src, options.bounds);

    ensure_parent(&cfg.output)?;
    transform::save_image(&warped, &cfg.output)
        .with_context(|| format!("Failed to write image {:?}", cfg.output))?;
    info!("Output: {:?}", cfg.output);

    // Only dump coefficients for a warp that was actually written
    if let Some(path) = coefficients {
        let json = serde_json::to_string_pretty(&warp)
            .context("Failed to serialize spline coefficients")?;
        ensure_parent(path)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write coefficients to {:?}", path))?;
        info!("Wrote spline coefficients to {:?}", path);
    }
    Ok(())
}

/// Create the directory an output file goes into
fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    Ok(())
}
