//! Thin-plate spline image warping
//!
//! The warp is an inverse mapping: two splines (one per axis) are fitted over
//! the *end* control points, giving for every output pixel the offset to the
//! source pixel it samples from. Optional pin points along the image border
//! hold the frame in place so the field does not drift away from the
//! user-supplied points.

use image::{DynamicImage, ImageBuffer, Pixel};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::config::Point;
use crate::error::{Error, Result};
use crate::tps::{radial_basis, ThinPlateSpline};

/// Default number of pin points per image side
pub const DEFAULT_PIN_POINTS: usize = 5;

/// Which source coordinates count as valid samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleBounds {
    /// `[0, W) x [0, H)`
    #[default]
    Symmetric,
    /// Same as `Symmetric` but source row 0 is never sampled, as the legacy
    /// warp script did. Use for bit-exact parity with its output.
    ExcludeTopRow,
}

impl SampleBounds {
    #[inline]
    pub fn contains(&self, x: i64, y: i64, width: u32, height: u32) -> bool {
        let min_y = match self {
            SampleBounds::Symmetric => 0,
            SampleBounds::ExcludeTopRow => 1,
        };
        x >= 0 && x < width as i64 && y >= min_y && y < height as i64
    }
}

/// Warp settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpOptions {
    /// Pin points per side; `None` or fewer than 2 disables pinning
    pub pin_points: Option<usize>,
    pub bounds: SampleBounds,
}

impl Default for WarpOptions {
    fn default() -> Self {
        Self {
            pin_points: Some(DEFAULT_PIN_POINTS),
            bounds: SampleBounds::default(),
        }
    }
}

/// Stationary anchor points evenly spaced around the image border
///
/// Steps are `(H-1)/(count-1)` rows and `(W-1)/(count-1)` columns (integer
/// division). The perimeter is walked clockwise from the top-left corner,
/// each side contributing `count - 1` points, so `4 * (count - 1)` distinct
/// points are returned.
pub fn pin_points(width: u32, height: u32, count: usize) -> Result<Vec<Point>> {
    if count < 2 {
        return Err(Error::InvalidControlPoints(format!(
            "pin point count must be at least 2, got {}",
            count
        )));
    }

    let segments = (count - 1) as u64;
    let step_x = u64::from(width.saturating_sub(1)) / segments;
    let step_y = u64::from(height.saturating_sub(1)) / segments;
    if step_x == 0 || step_y == 0 {
        return Err(Error::InvalidControlPoints(format!(
            "{} pin points per side do not fit a {}x{} image",
            count, width, height
        )));
    }

    let right = (segments * step_x) as f64;
    let bottom = (segments * step_y) as f64;
    let (step_x, step_y) = (step_x as f64, step_y as f64);

    let mut pins = Vec::with_capacity(4 * (count - 1));
    for i in 0..count - 1 {
        pins.push(Point::new(i as f64 * step_x, 0.0));
    }
    for i in 0..count - 1 {
        pins.push(Point::new(right, i as f64 * step_y));
    }
    for i in 0..count - 1 {
        pins.push(Point::new(right - i as f64 * step_x, bottom));
    }
    for i in 0..count - 1 {
        pins.push(Point::new(0.0, bottom - i as f64 * step_y));
    }

    Ok(pins)
}

/// A fitted inverse warp: one displacement spline per axis
#[derive(Debug, Clone, Serialize)]
pub struct TpsWarp {
    x: ThinPlateSpline,
    y: ThinPlateSpline,
}

impl TpsWarp {
    /// Fit the warp moving each `start[i]` to `end[i]` in a `width` x `height` image
    pub fn new(
        start: &[Point],
        end: &[Point],
        width: u32,
        height: u32,
        pins: Option<usize>,
    ) -> Result<Self> {
        if start.len() != end.len() {
            return Err(Error::InvalidControlPoints(format!(
                "{} start points but {} end points",
                start.len(),
                end.len()
            )));
        }
        if start.len() < 2 {
            return Err(Error::InvalidControlPoints(format!(
                "at least 2 control point pairs are required, got {}",
                start.len()
            )));
        }

        let mut start = start.to_vec();
        let mut end = end.to_vec();

        if let Some(count) = pins.filter(|&n| n >= 2) {
            let pins = pin_points(width, height, count)?;
            debug!("Adding {} pin points ({} per side)", pins.len(), count);
            start.extend_from_slice(&pins);
            end.extend_from_slice(&pins);
        }

        let delta_x: Vec<f64> = start.iter().zip(&end).map(|(s, e)| s.x - e.x).collect();
        let delta_y: Vec<f64> = start.iter().zip(&end).map(|(s, e)| s.y - e.y).collect();

        // Nothing moves: the field is zero and no system needs solving
        if delta_x.iter().chain(&delta_y).all(|d| *d == 0.0) {
            debug!("All control points are stationary, using identity warp");
            return Ok(Self {
                x: ThinPlateSpline::zero(&end),
                y: ThinPlateSpline::zero(&end),
            });
        }

        let x = ThinPlateSpline::fit(&end, &delta_x)?;
        let y = ThinPlateSpline::fit(&end, &delta_y)?;

        debug!("x displacement affine terms: {:?}", x.affine());
        debug!("y displacement affine terms: {:?}", y.affine());

        Ok(Self { x, y })
    }

    /// Where the output pixel (x, y) samples the source, before rounding
    ///
    /// Both splines share their anchors, so each kernel value is computed
    /// once and applied to both weight sets.
    #[inline]
    pub fn source_position(&self, x: f64, y: f64) -> (f64, f64) {
        let query = Point::new(x, y);
        let [ax0, ax1, ax2] = self.x.affine();
        let [ay0, ay1, ay2] = self.y.affine();

        let mut bend_x = 0.0;
        let mut bend_y = 0.0;
        for ((p, wx), wy) in self
            .x
            .points()
            .iter()
            .zip(self.x.weights())
            .zip(self.y.weights())
        {
            let u = radial_basis(p.distance(&query));
            bend_x += wx * u;
            bend_y += wy * u;
        }

        (
            x + ax0 + ax1 * x + ax2 * y + bend_x,
            y + ay0 + ay1 * x + ay2 * y + bend_y,
        )
    }

    /// The source pixel sampled by output pixel (x, y), if inside `bounds`
    #[inline]
    pub fn sample_position(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        bounds: SampleBounds,
    ) -> Option<(u32, u32)> {
        let (sx, sy) = self.source_position(x as f64, y as f64);
        let sx = sx.round_ties_even() as i64;
        let sy = sy.round_ties_even() as i64;
        bounds
            .contains(sx, sy, width, height)
            .then_some((sx as u32, sy as u32))
    }

    /// Number of anchor points (control plus pin points) per axis spline
    pub fn anchor_count(&self) -> usize {
        self.x.points().len()
    }

    /// Resample `src` through the warp; unsampled pixels stay zero
    pub fn apply<P: Pixel>(
        &self,
        src: &ImageBuffer<P, Vec<P::Subpixel>>,
        bounds: SampleBounds,
    ) -> ImageBuffer<P, Vec<P::Subpixel>> {
        let (width, height) = src.dimensions();

        let samples: Vec<Option<(u32, u32)>> = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..width).map(move |x| self.sample_position(x, y, width, height, bounds))
            })
            .collect();

        let mut out = ImageBuffer::new(width, height);
        let mut missed = 0usize;
        for (idx, sample) in samples.into_iter().enumerate() {
            let x = (idx % width as usize) as u32;
            let y = (idx / width as usize) as u32;
            match sample {
                Some((sx, sy)) => out.put_pixel(x, y, *src.get_pixel(sx, sy)),
                None => missed += 1,
            }
        }

        debug!(
            "{} of {} output pixels fell outside the source",
            missed,
            width as usize * height as usize
        );
        out
    }
}

/// Warp `src` so that each `start[i]` moves to `end[i]`
pub fn warp_image<P: Pixel>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    start: &[Point],
    end: &[Point],
    options: &WarpOptions,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>> {
    let warp = TpsWarp::new(start, end, src.width(), src.height(), options.pin_points)?;
    Ok(warp.apply(src, options.bounds))
}

/// Warp a decoded image, keeping its channel layout and bit depth
pub fn warp_dynamic(
    src: &DynamicImage,
    start: &[Point],
    end: &[Point],
    options: &WarpOptions,
) -> Result<DynamicImage> {
    let warp = TpsWarp::new(start, end, src.width(), src.height(), options.pin_points)?;
    info!(
        "Warping {}x{} image with {} anchor points",
        src.width(),
        src.height(),
        warp.anchor_count()
    );
    Ok(apply_dynamic(&warp, src, options.bounds))
}

/// Apply a fitted warp to any `DynamicImage` variant
pub fn apply_dynamic(warp: &TpsWarp, src: &DynamicImage, bounds: SampleBounds) -> DynamicImage {
    match src {
        DynamicImage::ImageLuma8(img) => DynamicImage::ImageLuma8(warp.apply(img, bounds)),
        DynamicImage::ImageLumaA8(img) => DynamicImage::ImageLumaA8(warp.apply(img, bounds)),
        DynamicImage::ImageRgb8(img) => DynamicImage::ImageRgb8(warp.apply(img, bounds)),
        DynamicImage::ImageRgba8(img) => DynamicImage::ImageRgba8(warp.apply(img, bounds)),
        DynamicImage::ImageLuma16(img) => DynamicImage::ImageLuma16(warp.apply(img, bounds)),
        DynamicImage::ImageLumaA16(img) => DynamicImage::ImageLumaA16(warp.apply(img, bounds)),
        DynamicImage::ImageRgb16(img) => DynamicImage::ImageRgb16(warp.apply(img, bounds)),
        DynamicImage::ImageRgba16(img) => DynamicImage::ImageRgba16(warp.apply(img, bounds)),
        DynamicImage::ImageRgb32F(img) => DynamicImage::ImageRgb32F(warp.apply(img, bounds)),
        DynamicImage::ImageRgba32F(img) => DynamicImage::ImageRgba32F(warp.apply(img, bounds)),
        other => {
            debug!("Converting unsupported pixel layout to RGBA8");
            DynamicImage::ImageRgba8(warp.apply(&other.to_rgba8(), bounds))
        }
    }
}

/// Decode an image file; the format is taken from its contents/extension
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let img = image::open(path)?;
    debug!("Loaded {:?} ({}x{}, {:?})", path, img.width(), img.height(), img.color());
    Ok(img)
}

/// Encode an image file; the format is taken from the extension
pub fn save_image(img: &DynamicImage, path: &Path) -> Result<()> {
    img.save(path)?;
    debug!("Saved {:?}", path);
    Ok(())
}
