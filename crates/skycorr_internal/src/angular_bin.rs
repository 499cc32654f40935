//! A single angular annulus and its correlation counters.
//!
//! # Accumulate, then derive
//!
//! An [`AngularBin`] is a pile of additive counters. Everything fed into it
//! (`add_to_*`, `move_weight`, `rescale_pair_counts`) is a plain increment,
//! so independent partitions of a pair workload can accumulate into separate
//! bins and be merged by summing raw counters. The derived quantities
//! (`wtheta`, the errors, the jackknife means) are nonlinear ratios of those
//! counters and are computed read-only, after every contribution has landed;
//! they must never be averaged across partial accumulations.
//!
//! # Two estimators, one bin
//!
//! There are two ways to estimate w(theta). Counting pairs of objects
//! separated by the annulus feeds the four Landy-Szalay components through
//! the pair-weight bucket. Alternatively, summing products of pixelized
//! over-densities feeds the pixel-sum and pixel-weight counters, and wants a
//! pixelization level matched to the angular scale of the annulus. Which
//! estimator a bin reports is fixed at construction by its [`BinMode`], so
//! none of the accessors need to guess from counter state.
//!
//! # Jackknife regions
//!
//! Each counter also has a dense per-region copy, sized once to the region
//! count and never resized. A pair that lands in regions `a` and `b` is
//! credited to *every other* region: each per-region bucket is then a
//! leave-two-out sample, and the spread of the per-region estimates gives
//! the jackknife error. A pair with either member outside the mapped
//! footprint contributes to the global counters only.

use std::cmp::Ordering;
use std::fmt;

use ndarray::Array1;

use crate::misc::{double_ge, double_le};
use crate::pixel::{resolution_at_level, Pixelization, DEG_TO_RAD, MAX_LEVEL, STRAD_TO_DEG2};

/// The estimator a bin is configured for, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinMode {
    /// Pair-counting: the Landy-Szalay components drive the estimator.
    Pair,
    /// Pixel-product at the given pixelization level: the pixel-sum and
    /// pixel-weight counters drive the estimator.
    Pixel { level: u32 },
}

impl BinMode {
    /// The pixel-product mode matched to an annulus: the coarsest level
    /// whose characteristic pixel scale `sqrt(2 * pixel_area)` resolves the
    /// annulus, scanning from coarse to fine. Falls back to [`BinMode::Pair`]
    /// when even the finest level cannot resolve `theta_max`.
    pub fn matched_level<G: Pixelization>(geom: &G, theta_min: f64, theta_max: f64) -> BinMode {
        for level in 0..=MAX_LEVEL {
            let scale = (2.0 * geom.pixel_area(resolution_at_level(level))).sqrt();
            if (double_ge(scale, theta_min) && double_le(scale, theta_max)) || scale < theta_min {
                return BinMode::Pixel { level };
            }
        }
        BinMode::Pair
    }
}

/// The four Landy-Szalay pair-count components.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Counter {
    DataData,
    DataRandom,
    RandomData,
    RandomRandom,
}

/// An annulus with `theta_min >= theta_max` (or non-finite limits) is
/// rejected at construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinRangeError {
    pub theta_min: f64,
    pub theta_max: f64,
}

impl fmt::Display for BinRangeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "invalid angular bin range [{}, {})",
            self.theta_min, self.theta_max
        )
    }
}

impl std::error::Error for BinRangeError {}

/// One angular annulus `[theta_min, theta_max)` in degrees, with global and
/// per-region correlation counters.
#[derive(Clone, Debug)]
pub struct AngularBin {
    theta_min: f64,
    theta_max: f64,
    theta: f64,
    sin2theta_min: f64,
    sin2theta_max: f64,
    costheta_min: f64,
    costheta_max: f64,
    mode: BinMode,
    n_region: usize,

    pixel_wtheta: f64,
    pixel_weight: f64,
    pair_weight: f64,
    pair_count: i64,
    data_data: f64,
    data_random: f64,
    random_data: f64,
    random_random: f64,

    pixel_wtheta_region: Array1<f64>,
    pixel_weight_region: Array1<f64>,
    pair_weight_region: Array1<f64>,
    pair_count_region: Array1<i64>,
    data_data_region: Array1<f64>,
    data_random_region: Array1<f64>,
    random_data_region: Array1<f64>,
    random_random_region: Array1<f64>,

    wtheta_override: Option<f64>,
    wtheta_error_override: Option<f64>,
}

impl AngularBin {
    /// A zeroed bin for the annulus `[theta_min, theta_max)` (degrees) with
    /// per-region state for `n_region` jackknife regions.
    pub fn new(
        theta_min: f64,
        theta_max: f64,
        mode: BinMode,
        n_region: usize,
    ) -> Result<AngularBin, BinRangeError> {
        if !theta_min.is_finite() || !theta_max.is_finite() || theta_min >= theta_max {
            return Err(BinRangeError {
                theta_min,
                theta_max,
            });
        }

        let zeros = || Array1::zeros(n_region);
        Ok(AngularBin {
            theta_min,
            theta_max,
            theta: 0.5 * (theta_min + theta_max),
            sin2theta_min: (theta_min * DEG_TO_RAD).sin().powi(2),
            sin2theta_max: (theta_max * DEG_TO_RAD).sin().powi(2),
            costheta_min: (theta_max * DEG_TO_RAD).cos(),
            costheta_max: (theta_min * DEG_TO_RAD).cos(),
            mode,
            n_region,
            pixel_wtheta: 0.0,
            pixel_weight: 0.0,
            pair_weight: 0.0,
            pair_count: 0,
            data_data: 0.0,
            data_random: 0.0,
            random_data: 0.0,
            random_random: 0.0,
            pixel_wtheta_region: zeros(),
            pixel_weight_region: zeros(),
            pair_weight_region: zeros(),
            pair_count_region: Array1::zeros(n_region),
            data_data_region: zeros(),
            data_random_region: zeros(),
            random_data_region: zeros(),
            random_random_region: zeros(),
            wtheta_override: None,
            wtheta_error_override: None,
        })
    }

    /// Shorthand for a pair-counting bin.
    pub fn pair(theta_min: f64, theta_max: f64, n_region: usize) -> Result<Self, BinRangeError> {
        AngularBin::new(theta_min, theta_max, BinMode::Pair, n_region)
    }

    /// Shorthand for a pixel-product bin at an explicit level.
    pub fn pixel(
        theta_min: f64,
        theta_max: f64,
        level: u32,
        n_region: usize,
    ) -> Result<Self, BinRangeError> {
        AngularBin::new(theta_min, theta_max, BinMode::Pixel { level }, n_region)
    }

    // ---- angular bookkeeping -------------------------------------------

    pub fn theta_min(&self) -> f64 {
        self.theta_min
    }

    pub fn theta_max(&self) -> f64 {
        self.theta_max
    }

    /// The representative angular scale of the bin. Defaults to the
    /// arithmetic midpoint; logarithmic binning overrides it with the
    /// geometric mean of the limits.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn set_theta(&mut self, theta: f64) {
        self.theta = theta;
    }

    pub fn sin2_theta_min(&self) -> f64 {
        self.sin2theta_min
    }

    pub fn sin2_theta_max(&self) -> f64 {
        self.sin2theta_max
    }

    pub fn cos_theta_min(&self) -> f64 {
        self.costheta_min
    }

    pub fn cos_theta_max(&self) -> f64 {
        self.costheta_max
    }

    pub fn mode(&self) -> BinMode {
        self.mode
    }

    pub fn n_region(&self) -> usize {
        self.n_region
    }

    /// Tolerant containment test against the angular limits, in degrees.
    pub fn is_within_bounds(&self, theta: f64) -> bool {
        double_ge(theta, self.theta_min) && double_le(theta, self.theta_max)
    }

    /// Containment test for a scale given as sin^2(theta).
    pub fn is_within_sin2_bounds(&self, sin2theta: f64) -> bool {
        double_ge(sin2theta, self.sin2theta_min) && double_le(sin2theta, self.sin2theta_max)
    }

    /// Containment test for a scale given as cos(theta).
    pub fn is_within_cos_bounds(&self, costheta: f64) -> bool {
        double_ge(costheta, self.costheta_min) && double_le(costheta, self.costheta_max)
    }

    /// Area of the annulus in square degrees.
    pub fn area(&self) -> f64 {
        (self.costheta_max - self.costheta_min) * 2.0 * core::f64::consts::PI * STRAD_TO_DEG2
    }

    /// Expected Poisson noise on the annulus for a survey of the given
    /// object density (per square degree) and area.
    pub fn poisson_noise(&self, objects_per_square_degree: f64, survey_area: f64) -> f64 {
        1.0 / (objects_per_square_degree * objects_per_square_degree * survey_area * self.area())
            .sqrt()
    }

    /// Ordering by lower angular limit, for sorting bin collections.
    pub fn theta_order(a: &AngularBin, b: &AngularBin) -> Ordering {
        a.theta_min
            .partial_cmp(&b.theta_min)
            .unwrap_or(Ordering::Equal)
    }

    // ---- accumulation ---------------------------------------------------

    /// Add an over-density product to the pixel-sum and its weight to the
    /// pixel-weight. When both regions are present, the same increments are
    /// applied to every region *except* `region_a` and `region_b`, so each
    /// per-region bucket stays a leave-two-out sample. A missing region
    /// (member outside the mapped footprint) restricts the increment to the
    /// global counters.
    pub fn add_to_pixel_wtheta(
        &mut self,
        dwtheta: f64,
        dweight: f64,
        region_a: Option<usize>,
        region_b: Option<usize>,
    ) {
        self.pixel_wtheta += dwtheta;
        self.pixel_weight += dweight;
        if let (Some(a), Some(b)) = (region_a, region_b) {
            for k in 0..self.n_region {
                if k != a && k != b {
                    self.pixel_wtheta_region[k] += dwtheta;
                    self.pixel_weight_region[k] += dweight;
                }
            }
        }
    }

    /// Add a pair's weight product to the running pair-weight bucket,
    /// leave-two-out per region.
    pub fn add_to_weight(&mut self, weight: f64, region_a: Option<usize>, region_b: Option<usize>) {
        self.pair_weight += weight;
        if let (Some(a), Some(b)) = (region_a, region_b) {
            for k in 0..self.n_region {
                if k != a && k != b {
                    self.pair_weight_region[k] += weight;
                }
            }
        }
    }

    /// Add to the raw pair counter, leave-two-out per region.
    pub fn add_to_counter(&mut self, step: i64, region_a: Option<usize>, region_b: Option<usize>) {
        self.pair_count += step;
        if let (Some(a), Some(b)) = (region_a, region_b) {
            for k in 0..self.n_region {
                if k != a && k != b {
                    self.pair_count_region[k] += step;
                }
            }
        }
    }

    /// Add both a pair weight and a pair count in one call.
    pub fn add_to_pair_wtheta(
        &mut self,
        weight: f64,
        step: i64,
        region_a: Option<usize>,
        region_b: Option<usize>,
    ) {
        self.pair_weight += weight;
        self.pair_count += step;
        if let (Some(a), Some(b)) = (region_a, region_b) {
            for k in 0..self.n_region {
                if k != a && k != b {
                    self.pair_weight_region[k] += weight;
                    self.pair_count_region[k] += step;
                }
            }
        }
    }

    /// Latch the running pair-weight (global and every per-region bucket)
    /// into one of the Landy-Szalay components and zero the bucket. Called
    /// once per catalog-pair type.
    pub fn move_weight(&mut self, counter: Counter) {
        match counter {
            Counter::DataData => {
                self.data_data += self.pair_weight;
                self.data_data_region += &self.pair_weight_region;
            }
            Counter::DataRandom => {
                self.data_random += self.pair_weight;
                self.data_random_region += &self.pair_weight_region;
            }
            Counter::RandomData => {
                self.random_data += self.pair_weight;
                self.random_data_region += &self.pair_weight_region;
            }
            Counter::RandomRandom => {
                self.random_random += self.pair_weight;
                self.random_random_region += &self.pair_weight_region;
            }
        }
        self.pair_weight = 0.0;
        self.pair_weight_region.fill(0.0);
    }

    /// Divide a component (global and per-region) by `scale`, normalizing
    /// for a random catalog whose size differs from the data catalog's.
    pub fn rescale_pair_counts(&mut self, counter: Counter, scale: f64) {
        match counter {
            Counter::DataData => {
                self.data_data /= scale;
                self.data_data_region /= scale;
            }
            Counter::DataRandom => {
                self.data_random /= scale;
                self.data_random_region /= scale;
            }
            Counter::RandomData => {
                self.random_data /= scale;
                self.random_data_region /= scale;
            }
            Counter::RandomRandom => {
                self.random_random /= scale;
                self.random_random_region /= scale;
            }
        }
    }

    // ---- resets ---------------------------------------------------------

    /// Zero every counter and drop the overrides.
    pub fn reset(&mut self) {
        self.pixel_wtheta = 0.0;
        self.pixel_weight = 0.0;
        self.pair_weight = 0.0;
        self.pair_count = 0;
        self.data_data = 0.0;
        self.data_random = 0.0;
        self.random_data = 0.0;
        self.random_random = 0.0;
        self.pixel_wtheta_region.fill(0.0);
        self.pixel_weight_region.fill(0.0);
        self.pair_weight_region.fill(0.0);
        self.pair_count_region.fill(0);
        self.data_data_region.fill(0.0);
        self.data_random_region.fill(0.0);
        self.random_data_region.fill(0.0);
        self.random_random_region.fill(0.0);
        self.wtheta_override = None;
        self.wtheta_error_override = None;
    }

    pub fn reset_pixel_wtheta(&mut self) {
        self.pixel_wtheta = 0.0;
        self.pixel_weight = 0.0;
        self.pixel_wtheta_region.fill(0.0);
        self.pixel_weight_region.fill(0.0);
    }

    pub fn reset_weight(&mut self) {
        self.pair_weight = 0.0;
        self.pair_weight_region.fill(0.0);
    }

    pub fn reset_counter(&mut self) {
        self.pair_count = 0;
        self.pair_count_region.fill(0);
    }

    pub fn reset_pair_counts(&mut self, counter: Counter) {
        match counter {
            Counter::DataData => {
                self.data_data = 0.0;
                self.data_data_region.fill(0.0);
            }
            Counter::DataRandom => {
                self.data_random = 0.0;
                self.data_random_region.fill(0.0);
            }
            Counter::RandomData => {
                self.random_data = 0.0;
                self.random_data_region.fill(0.0);
            }
            Counter::RandomRandom => {
                self.random_random = 0.0;
                self.random_random_region.fill(0.0);
            }
        }
    }

    // ---- raw counter access --------------------------------------------

    pub fn pixel_wtheta(&self) -> f64 {
        self.pixel_wtheta
    }

    pub fn pixel_wtheta_region(&self, region: usize) -> Option<f64> {
        self.pixel_wtheta_region.get(region).copied()
    }

    pub fn pixel_weight(&self) -> f64 {
        self.pixel_weight
    }

    pub fn pixel_weight_region(&self, region: usize) -> Option<f64> {
        self.pixel_weight_region.get(region).copied()
    }

    pub fn pair_weight(&self) -> f64 {
        self.pair_weight
    }

    pub fn pair_weight_region(&self, region: usize) -> Option<f64> {
        self.pair_weight_region.get(region).copied()
    }

    pub fn pair_counts(&self) -> i64 {
        self.pair_count
    }

    pub fn pair_counts_region(&self, region: usize) -> Option<i64> {
        self.pair_count_region.get(region).copied()
    }

    pub fn component(&self, counter: Counter) -> f64 {
        match counter {
            Counter::DataData => self.data_data,
            Counter::DataRandom => self.data_random,
            Counter::RandomData => self.random_data,
            Counter::RandomRandom => self.random_random,
        }
    }

    pub fn component_region(&self, counter: Counter, region: usize) -> Option<f64> {
        let values = match counter {
            Counter::DataData => &self.data_data_region,
            Counter::DataRandom => &self.data_random_region,
            Counter::RandomData => &self.random_data_region,
            Counter::RandomRandom => &self.random_random_region,
        };
        values.get(region).copied()
    }

    // ---- derived estimators --------------------------------------------

    /// The correlation estimate for the whole survey: Landy-Szalay in pair
    /// mode, the weighted mean over-density product in pixel mode. An
    /// explicit [`AngularBin::set_wtheta`] takes precedence.
    pub fn wtheta(&self) -> f64 {
        if let Some(wtheta) = self.wtheta_override {
            return wtheta;
        }
        match self.mode {
            BinMode::Pair => {
                (self.data_data - self.data_random - self.random_data + self.random_random)
                    / self.random_random
            }
            BinMode::Pixel { .. } => self.pixel_wtheta / self.pixel_weight,
        }
    }

    /// The leave-two-out correlation estimate for one region, or `None` for
    /// an out-of-range region index.
    pub fn wtheta_region(&self, region: usize) -> Option<f64> {
        if region >= self.n_region {
            return None;
        }
        Some(self.wtheta_region_unchecked(region))
    }

    fn wtheta_region_unchecked(&self, region: usize) -> f64 {
        match self.mode {
            BinMode::Pair => {
                (self.data_data_region[region] - self.data_random_region[region]
                    - self.random_data_region[region]
                    + self.random_random_region[region])
                    / self.random_random_region[region]
            }
            BinMode::Pixel { .. } => {
                self.pixel_wtheta_region[region] / self.pixel_weight_region[region]
            }
        }
    }

    /// The default shot-noise error `1/sqrt(N)`, where `N` is the data-data
    /// component in pair mode and the pixel-weight in pixel mode. An
    /// explicit [`AngularBin::set_wtheta_error`] takes precedence.
    pub fn wtheta_error(&self) -> f64 {
        if let Some(error) = self.wtheta_error_override {
            return error;
        }
        match self.mode {
            BinMode::Pair => 1.0 / self.data_data.sqrt(),
            BinMode::Pixel { .. } => 1.0 / self.pixel_weight.sqrt(),
        }
    }

    pub fn wtheta_error_region(&self, region: usize) -> Option<f64> {
        if region >= self.n_region {
            return None;
        }
        Some(match self.mode {
            BinMode::Pair => 1.0 / self.data_data_region[region].sqrt(),
            BinMode::Pixel { .. } => 1.0 / self.pixel_weight_region[region].sqrt(),
        })
    }

    /// Override the derived correlation value.
    pub fn set_wtheta(&mut self, wtheta: f64) {
        self.wtheta_override = Some(wtheta);
    }

    /// Override the derived error value.
    pub fn set_wtheta_error(&mut self, error: f64) {
        self.wtheta_error_override = Some(error);
    }

    /// Mean pair weight per raw pair, the weighted cross-correlation.
    pub fn weighted_cross_correlation(&self) -> f64 {
        self.pair_weight / self.pair_count as f64
    }

    pub fn weighted_cross_correlation_region(&self, region: usize) -> Option<f64> {
        if region >= self.n_region {
            return None;
        }
        Some(self.pair_weight_region[region] / self.pair_count_region[region] as f64)
    }

    // ---- jackknife aggregates ------------------------------------------

    /// Average of the per-region correlation estimates.
    pub fn mean_wtheta(&self) -> f64 {
        if self.n_region == 0 {
            return 0.0;
        }
        let sum: f64 = (0..self.n_region)
            .map(|k| self.wtheta_region_unchecked(k))
            .sum();
        sum / self.n_region as f64
    }

    /// Jackknife error on [`AngularBin::mean_wtheta`].
    ///
    /// This is `(n - 1)/n * sqrt(sum((mean - x_k)^2))`: the `(n-1)/n` factor
    /// scales the square root of the summed squared deviations, not the
    /// variance itself.
    pub fn mean_wtheta_error(&self) -> f64 {
        if self.n_region == 0 {
            return 0.0;
        }
        let n = self.n_region as f64;
        let mean = self.mean_wtheta();
        let sum_sq: f64 = (0..self.n_region)
            .map(|k| {
                let dev = mean - self.wtheta_region_unchecked(k);
                dev * dev
            })
            .sum();
        (n - 1.0) / n * sum_sq.sqrt()
    }

    /// Average per-region pair weight.
    pub fn mean_weight(&self) -> f64 {
        if self.n_region == 0 {
            return 0.0;
        }
        self.pair_weight_region.sum() / self.n_region as f64
    }

    /// Average per-region raw pair count.
    pub fn mean_counter(&self) -> f64 {
        if self.n_region == 0 {
            return 0.0;
        }
        self.pair_count_region.iter().map(|&c| c as f64).sum::<f64>() / self.n_region as f64
    }

    /// Average per-region value of a Landy-Szalay component.
    pub fn mean_pair_counts(&self, counter: Counter) -> f64 {
        if self.n_region == 0 {
            return 0.0;
        }
        let values = match counter {
            Counter::DataData => &self.data_data_region,
            Counter::DataRandom => &self.data_random_region,
            Counter::RandomData => &self.random_data_region,
            Counter::RandomRandom => &self.random_random_region,
        };
        values.sum() / self.n_region as f64
    }

    /// Average of the per-region weighted cross-correlations.
    pub fn mean_weighted_cross_correlation(&self) -> f64 {
        if self.n_region == 0 {
            return 0.0;
        }
        let sum: f64 = (0..self.n_region)
            .map(|k| self.pair_weight_region[k] / self.pair_count_region[k] as f64)
            .sum();
        sum / self.n_region as f64
    }

    /// Jackknife error on the mean weighted cross-correlation, in the same
    /// form as [`AngularBin::mean_wtheta_error`].
    pub fn mean_weighted_cross_correlation_error(&self) -> f64 {
        if self.n_region == 0 {
            return 0.0;
        }
        let n = self.n_region as f64;
        let mean = self.mean_weighted_cross_correlation();
        let sum_sq: f64 = (0..self.n_region)
            .map(|k| {
                let dev = mean - self.pair_weight_region[k] / self.pair_count_region[k] as f64;
                dev * dev
            })
            .sum();
        (n - 1.0) / n * sum_sq.sqrt()
    }
}
