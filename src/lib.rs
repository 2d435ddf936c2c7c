//! Thin-plate spline image warping and calibration target generation
//!
//! - [`tps`]: radial basis kernel, spline fitting and evaluation
//! - [`transform`]: inverse image warping driven by control point pairs
//! - [`calibration`]: checkerboard and RGB color-cube reference images
//! - [`config`]: TOML job configuration used by the `tpswarp` binary

pub mod calibration;
pub mod config;
pub mod error;
pub mod tps;
pub mod transform;

pub use config::Point;
pub use error::{Error, Result};
pub use tps::{radial_basis, ThinPlateSpline};
pub use transform::{pin_points, warp_dynamic, warp_image, SampleBounds, TpsWarp, WarpOptions};
