//! Core machinery for region-aware angular correlation measurements.
//!
//! # Architecture
//!
//! The crate is built around two data structures and the seam between them:
//!
//! - A [`RegionMap`] partitions a footprint on a hierarchically pixelized
//!   sky into contiguous, roughly equal-area regions, and answers "which
//!   region is this pixel in" for the accumulation machinery. It is built
//!   once and read-only afterwards, so concurrent lookups from parallel
//!   accumulation workers are safe.
//! - An [`AngularBin`] holds the additive counters for one angular annulus,
//!   globally and per region, together with the derived Landy-Szalay or
//!   pixel-product estimator and its jackknife aggregates. Raw counters from
//!   independent partial accumulations merge by summing; the derived values
//!   are nonlinear and are computed once, at the end.
//!
//! The pixel hierarchy itself is an external collaborator, reached through
//! the [`Pixelization`] and [`Footprint`] traits; the [`GridGeometry`]
//! reference implementation exists so all of the above can be exercised on a
//! flat toy sky.
//!
//! The public `skycorr` crate layers the correlation drivers and the
//! user-facing error type on top of this one.

mod angular_bin;
mod field;
mod grid;
mod misc;
mod pixel;
mod region_map;

pub use angular_bin::{AngularBin, BinMode, BinRangeError, Counter};
pub use field::{FieldError, FieldPixel, FieldType, FieldUnion};
pub use grid::{GridFootprint, GridGeometry};
pub use pixel::{
    resolution_at_level, CoveragePixel, Footprint, Pixelization, BASE_RESOLUTION, DEG_TO_RAD,
    MAX_LEVEL, MAX_REGION_RESOLUTION, RAD_TO_DEG, SOFT_REGION_RESOLUTION, STRAD_TO_DEG2,
};
pub use region_map::{RegionError, RegionMap};
