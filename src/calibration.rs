//! Calibration target generation
//!
//! Two printable references are produced: a black and white checkerboard,
//! and a color map that lays out a sampled RGB cube as a grid of flat color
//! squares.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::error::{Error, Result};

/// Checkerboard of `squares_x` by `squares_y` squares, each `square_px` wide.
/// The top-left square is black.
pub fn checkerboard(squares_x: u32, squares_y: u32, square_px: u32) -> Result<GrayImage> {
    if squares_x == 0 || squares_y == 0 || square_px == 0 {
        return Err(Error::InvalidParameter(format!(
            "checkerboard needs at least one square of at least one pixel, got {}x{} squares of {}px",
            squares_x, squares_y, square_px
        )));
    }
    let width = image_side(squares_x, square_px)?;
    let height = image_side(squares_y, square_px)?;

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let parity = (x / square_px + y / square_px) % 2;
        Luma([if parity == 1 { 255 } else { 0 }])
    }))
}

/// Levels sampled along each RGB axis: `min(256 * k / (n - 1), 255)`, truncated
pub fn channel_levels(steps: u32) -> Vec<u8> {
    if steps == 1 {
        return vec![0];
    }
    (0..steps)
        .map(|k| {
            let level = 256.0 * k as f64 / (steps - 1) as f64;
            level.min(255.0) as u8
        })
        .collect()
}

/// Layout of the sampled RGB cube as a grid of cells
///
/// The cube is cut into `steps` slices along `split_dim` and the slices are
/// chained into one strip. Slices along axes 1 and 2 sit side by side, giving
/// a strip `steps` cells tall and `steps^2` wide. Slices along axis 0 stack
/// vertically instead, giving a strip `steps^2` tall and `steps` wide. The
/// strip's columns are then cut into `square_rows` equal bands, stacked top
/// to bottom.
#[derive(Debug, Clone)]
pub struct ColorMapLayout {
    levels: Vec<u8>,
    split_dim: usize,
    strip_rows: u32,
    band_width: u32,
    square_rows: u32,
}

impl ColorMapLayout {
    pub fn new(steps: u32, split_dim: usize, square_rows: u32) -> Result<Self> {
        if steps == 0 {
            return Err(Error::InvalidParameter(
                "color map needs at least one step per channel".to_string(),
            ));
        }
        if split_dim > 2 {
            return Err(Error::InvalidParameter(format!(
                "split dimension must be 0, 1 or 2, got {}",
                split_dim
            )));
        }
        let slice_cells = steps.checked_mul(steps).ok_or_else(|| {
            Error::InvalidParameter(format!("{} steps per channel is too many", steps))
        })?;
        let (strip_cols, strip_rows) = if split_dim == 0 {
            (steps, slice_cells)
        } else {
            (slice_cells, steps)
        };
        if square_rows == 0 || strip_cols % square_rows != 0 {
            return Err(Error::InvalidParameter(format!(
                "{} strip columns cannot be split into {} equal rows",
                strip_cols, square_rows
            )));
        }

        Ok(Self {
            levels: channel_levels(steps),
            split_dim,
            strip_rows,
            band_width: strip_cols / square_rows,
            square_rows,
        })
    }

    /// Grid size in cells: (columns, rows)
    pub fn grid_size(&self) -> (u32, u32) {
        (self.band_width, self.square_rows * self.strip_rows)
    }

    fn steps(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Color of the cell at grid column `col`, row `row`
    pub fn cell_color(&self, col: u32, row: u32) -> Rgb<u8> {
        let n = self.steps();
        let band = row / self.strip_rows;
        let strip_row = row % self.strip_rows;
        let strip_col = band * self.band_width + col;

        // Cube index (i, j, k)
        let (i, j, k) = match self.split_dim {
            0 => (strip_row / n, strip_row % n, strip_col),
            1 => (strip_row, strip_col / n, strip_col % n),
            _ => (strip_row, strip_col % n, strip_col / n),
        };

        Rgb([
            self.levels[j as usize],
            self.levels[i as usize],
            self.levels[k as usize],
        ])
    }

    /// Render the grid with each cell `square_px` wide
    pub fn render(&self, square_px: u32) -> Result<RgbImage> {
        if square_px == 0 {
            return Err(Error::InvalidParameter(
                "color map squares must be at least one pixel".to_string(),
            ));
        }
        let (cols, rows) = self.grid_size();
        let width = image_side(cols, square_px)?;
        let height = image_side(rows, square_px)?;

        Ok(RgbImage::from_fn(width, height, |x, y| {
            self.cell_color(x / square_px, y / square_px)
        }))
    }
}

/// Color map of the RGB cube sampled at `steps_per_dim` levels per channel
pub fn color_map(
    steps_per_dim: u32,
    split_dim: usize,
    square_rows: u32,
    square_px: u32,
) -> Result<RgbImage> {
    ColorMapLayout::new(steps_per_dim, split_dim, square_rows)?.render(square_px)
}

fn image_side(cells: u32, square_px: u32) -> Result<u32> {
    cells.checked_mul(square_px).ok_or_else(|| {
        Error::InvalidParameter(format!("{} cells of {}px overflow the image size", cells, square_px))
    })
}
