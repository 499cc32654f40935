/*!
Region decomposition and two-point angular correlation estimation on a
hierarchically pixelized sky.

# High-Level: correlations with jackknife errors

Measuring a two-point angular correlation function takes three ingredients:

- a [`RegionMap`], which partitions the survey footprint into contiguous,
  roughly equal-area regions used for jackknife resampling;
- a ladder of [`AngularBin`]s, each accumulating pair or pixel-product
  statistics for one annulus of angular scale, globally and per region;
- an [`AngularCorrelation`] orchestrator, which routes candidate pairs (found
  by external machinery and pre-filtered by separation) into the right bin
  with the right region bookkeeping.

Pair-counting bins estimate w(theta) with the Landy-Szalay combination of
data-data, data-random, random-data and random-random pair counts;
pixel-product bins estimate it from sums of over-density products of a
[`FieldUnion`] pixelized at a level matched to the angular scale. Each
region's counters exclude the pairs touching that region (and its partner's),
so the spread of the per-region estimates gives the jackknife error.

The pixel hierarchy itself — id encoding, areas, coverages — is an external
collaborator reached through the [`Pixelization`] and [`Footprint`] traits.
[`GridGeometry`] is a flat reference implementation for tests and examples.

# Developer Guide

The data structures live in [`skycorr_internal`]; this crate adds the
correlation drivers and the public [`Error`] type.

*/

#![deny(rustdoc::broken_intra_doc_links)]

// inform build-system of the crates in this package
mod correlation;
mod error;

// pull in symbols that are visible outside of the package
pub use correlation::{
    auto_correlate_field, cross_correlate_fields, AngularCorrelation, PairEvent, PixelPair,
};
pub use error::Error;
pub use skycorr_internal::{
    resolution_at_level, AngularBin, BinMode, BinRangeError, Counter, CoveragePixel, FieldError,
    FieldPixel, FieldType, FieldUnion, Footprint, GridFootprint, GridGeometry, Pixelization,
    RegionError, RegionMap, BASE_RESOLUTION, DEG_TO_RAD, MAX_LEVEL, MAX_REGION_RESOLUTION,
    RAD_TO_DEG, SOFT_REGION_RESOLUTION, STRAD_TO_DEG2,
};
