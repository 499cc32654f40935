//! Drives pair and pixel-product accumulation across a ladder of angular
//! bins.
//!
//! The raw pair search is not this crate's job: an external finder walks the
//! catalogs (or pixel coverings) and hands over candidate pairs already
//! filtered by angular separation. The orchestrator's job is the bookkeeping
//! around them: resolve each member's jackknife region through the
//! [`RegionMap`], route the increment to the bin covering the separation,
//! and latch the running totals into the right Landy-Szalay component at
//! each stage boundary.
//!
//! The canonical pair-counting sequence is
//!
//! ```text
//! add_pairs(data x data)      ; finish_pair_stage(DataData)
//! add_pairs(data x random)    ; finish_pair_stage(DataRandom)
//! add_pairs(random x data)    ; finish_pair_stage(RandomData)
//! add_pairs(random x random)  ; finish_pair_stage(RandomRandom)
//! rescale_pair_counts(...)    // if the catalogs differ in size
//! ```
//!
//! after which the per-bin estimator and jackknife aggregates are valid to
//! read. Repeating a stage over several random realizations and rescaling by
//! the realization count averages them.

use log::warn;

use skycorr_internal::{
    AngularBin, BinMode, BinRangeError, Counter, FieldType, FieldUnion, Pixelization, RegionMap,
    resolution_at_level, MAX_LEVEL,
};

use crate::error::Error;

/// One candidate pair from the external pair finder: two catalog members,
/// their angular separation in degrees, and the product of their weights.
#[derive(Clone, Copy, Debug)]
pub struct PairEvent<P> {
    pub a: P,
    pub b: P,
    pub separation: f64,
    pub weight: f64,
}

/// One candidate pixel pair from the external finder, identified by pixel
/// ids at the field's level.
#[derive(Clone, Copy, Debug)]
pub struct PixelPair {
    pub id_a: u64,
    pub id_b: u64,
    pub separation: f64,
}

/// An ordered ladder of angular bins over `[theta_min, theta_max)`.
#[derive(Clone, Debug)]
pub struct AngularCorrelation {
    theta_min: f64,
    theta_max: f64,
    bins: Vec<AngularBin>,
    n_region: usize,
}

impl AngularCorrelation {
    /// Logarithmic binning with `bins_per_decade` bins per factor of ten,
    /// the usual choice for correlation functions spanning several decades
    /// of scale. The last bin may overshoot `theta_max` to complete its
    /// logarithmic width. Every bin starts in pair mode; see
    /// [`AngularCorrelation::with_matched_levels`].
    pub fn log_binned(
        theta_min: f64,
        theta_max: f64,
        bins_per_decade: u32,
        n_region: usize,
    ) -> Result<AngularCorrelation, Error> {
        if bins_per_decade == 0 {
            return Err(Error::empty_binning());
        }
        if !theta_min.is_finite() || !theta_max.is_finite() || theta_min <= 0.0 {
            return Err(BinRangeError {
                theta_min,
                theta_max,
            }
            .into());
        }

        let log_min = theta_min.log10();
        let log_max = theta_max.log10();
        let unit = 1.0 / bins_per_decade as f64;
        let span = (log_max - log_min) * bins_per_decade as f64;
        if span <= 0.0 {
            return Err(BinRangeError {
                theta_min,
                theta_max,
            }
            .into());
        }
        let n_bins = if (span - span.round()).abs() < 1.0e-9 {
            span.round() as usize
        } else {
            span.ceil() as usize
        };

        let mut bins = Vec::with_capacity(n_bins);
        for i in 0..n_bins {
            let lo = 10.0_f64.powf(log_min + i as f64 * unit);
            let hi = 10.0_f64.powf(log_min + (i + 1) as f64 * unit);
            let mut bin = AngularBin::pair(lo, hi, n_region)?;
            bin.set_theta(10.0_f64.powf(log_min + (i as f64 + 0.5) * unit));
            bins.push(bin);
        }
        Ok(AngularCorrelation::from_bins(bins, n_region))
    }

    /// Uniform binning into `n_bins` equal-width annuli.
    pub fn linear_binned(
        theta_min: f64,
        theta_max: f64,
        n_bins: usize,
        n_region: usize,
    ) -> Result<AngularCorrelation, Error> {
        if n_bins == 0 {
            return Err(Error::empty_binning());
        }
        if !theta_min.is_finite() || !theta_max.is_finite() || theta_min >= theta_max {
            return Err(BinRangeError {
                theta_min,
                theta_max,
            }
            .into());
        }

        let width = (theta_max - theta_min) / n_bins as f64;
        let mut bins = Vec::with_capacity(n_bins);
        for i in 0..n_bins {
            let lo = theta_min + i as f64 * width;
            let hi = theta_min + (i + 1) as f64 * width;
            bins.push(AngularBin::pair(lo, hi, n_region)?);
        }
        Ok(AngularCorrelation::from_bins(bins, n_region))
    }

    fn from_bins(mut bins: Vec<AngularBin>, n_region: usize) -> AngularCorrelation {
        bins.sort_by(AngularBin::theta_order);
        let theta_min = bins.first().map(|b| b.theta_min()).unwrap_or(0.0);
        let theta_max = bins.last().map(|b| b.theta_max()).unwrap_or(0.0);
        AngularCorrelation {
            theta_min,
            theta_max,
            bins,
            n_region,
        }
    }

    /// Reconfigure every bin with the pixel-product level matched to its
    /// angular scale. Bins whose matched level is finer than `max_level`
    /// stay in pair mode (pair counting is the high-resolution method).
    ///
    /// Bins are rebuilt zeroed, so call this before any accumulation.
    pub fn with_matched_levels<G: Pixelization>(
        mut self,
        geom: &G,
        max_level: Option<u32>,
    ) -> AngularCorrelation {
        let max_level = max_level.unwrap_or(MAX_LEVEL);
        for bin in &mut self.bins {
            let mode = match BinMode::matched_level(geom, bin.theta_min(), bin.theta_max()) {
                BinMode::Pixel { level } if level > max_level => {
                    warn!(
                        "bin [{}, {}) wants level {level}, above the maximum {max_level}; \
                         falling back to pair counting",
                        bin.theta_min(),
                        bin.theta_max()
                    );
                    BinMode::Pair
                }
                mode => mode,
            };
            if let Ok(mut rebuilt) =
                AngularBin::new(bin.theta_min(), bin.theta_max(), mode, self.n_region)
            {
                rebuilt.set_theta(bin.theta());
                *bin = rebuilt;
            }
        }
        self
    }

    // ---- read access ----------------------------------------------------

    pub fn theta_min(&self) -> f64 {
        self.theta_min
    }

    pub fn theta_max(&self) -> f64 {
        self.theta_max
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn n_region(&self) -> usize {
        self.n_region
    }

    pub fn bins(&self) -> &[AngularBin] {
        &self.bins
    }

    pub fn bins_mut(&mut self) -> &mut [AngularBin] {
        &mut self.bins
    }

    /// The bin whose `[theta_min, theta_max)` range covers `theta`.
    pub fn bin_for_theta(&self, theta: f64) -> Option<&AngularBin> {
        self.bin_index_for(theta).map(|idx| &self.bins[idx])
    }

    pub fn bin_for_theta_mut(&mut self, theta: f64) -> Option<&mut AngularBin> {
        self.bin_index_for(theta).map(|idx| &mut self.bins[idx])
    }

    fn bin_index_for(&self, theta: f64) -> Option<usize> {
        let upper = self.bins.partition_point(|b| b.theta_min() <= theta);
        if upper == 0 {
            return None;
        }
        let idx = upper - 1;
        (theta < self.bins[idx].theta_max()).then_some(idx)
    }

    // ---- pair-counting path --------------------------------------------

    /// Feed one pair with pre-resolved region ids. Returns `false` when the
    /// separation falls outside every bin.
    pub fn add_pair(
        &mut self,
        separation: f64,
        weight: f64,
        region_a: Option<usize>,
        region_b: Option<usize>,
    ) -> bool {
        match self.bin_index_for(separation) {
            Some(idx) => {
                self.bins[idx].add_to_pair_wtheta(weight, 1, region_a, region_b);
                true
            }
            None => false,
        }
    }

    /// Feed a stream of candidate pairs, resolving each member's region
    /// through the region map (`None` outside the mapped footprint). Returns
    /// the number of pairs that landed in a bin.
    pub fn add_pairs<G, I>(&mut self, geom: &G, regions: &RegionMap, events: I) -> u64
    where
        G: Pixelization,
        I: IntoIterator<Item = PairEvent<G::Point>>,
    {
        let mut accepted = 0;
        for event in events {
            let region_a = regions.find_region_at(geom, &event.a);
            let region_b = regions.find_region_at(geom, &event.b);
            if self.add_pair(event.separation, event.weight, region_a, region_b) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Latch the running pair weights of every bin into a Landy-Szalay
    /// component. Call once at the end of each catalog-pair stage.
    pub fn finish_pair_stage(&mut self, counter: Counter) {
        for bin in &mut self.bins {
            bin.move_weight(counter);
        }
    }

    /// Rescale a component on every bin, normalizing for random catalogs
    /// whose size differs from the data catalog's (or for averaging several
    /// random realizations).
    pub fn rescale_pair_counts(&mut self, counter: Counter, scale: f64) {
        for bin in &mut self.bins {
            bin.rescale_pair_counts(counter, scale);
        }
    }
}

/// Auto-correlate a field through a pixel-mode bin.
///
/// Density-type fields are converted to over-density in place first, which
/// is what the pixel-product estimator assumes. The external finder supplies
/// the pixel pairs for the bin's annulus; pairs outside the annulus or
/// naming pixels absent from the field are skipped.
pub fn auto_correlate_field<G, I>(
    bin: &mut AngularBin,
    geom: &G,
    regions: Option<&RegionMap>,
    field: &mut FieldUnion,
    pairs: I,
) -> Result<(), Error>
where
    G: Pixelization,
    I: IntoIterator<Item = PixelPair>,
{
    check_pixel_mode(bin, field)?;
    if field.field_type() == FieldType::Density {
        field.convert_to_over_density();
    }
    correlate_field_pixels(bin, geom, regions, field, field, pairs);
    Ok(())
}

/// Cross-correlate two fields (at the same level) through a pixel-mode bin.
/// Both fields receive the over-density transform when density-typed, so the
/// two sides enter the estimator consistently.
pub fn cross_correlate_fields<G, I>(
    bin: &mut AngularBin,
    geom: &G,
    regions: Option<&RegionMap>,
    field_a: &mut FieldUnion,
    field_b: &mut FieldUnion,
    pairs: I,
) -> Result<(), Error>
where
    G: Pixelization,
    I: IntoIterator<Item = PixelPair>,
{
    if field_a.level() != field_b.level() {
        return Err(Error::level_mismatch(field_a.level(), field_b.level()));
    }
    check_pixel_mode(bin, field_a)?;
    if field_a.field_type() == FieldType::Density {
        field_a.convert_to_over_density();
    }
    if field_b.field_type() == FieldType::Density {
        field_b.convert_to_over_density();
    }
    correlate_field_pixels(bin, geom, regions, field_a, field_b, pairs);
    Ok(())
}

fn check_pixel_mode(bin: &AngularBin, field: &FieldUnion) -> Result<(), Error> {
    match bin.mode() {
        BinMode::Pixel { level } if level == field.level() => Ok(()),
        _ => Err(Error::mode_mismatch(field.level())),
    }
}

/// Shared accumulation path for auto- and cross-correlation: the two inputs
/// only differ in whether they are the same union.
fn correlate_field_pixels<G, I>(
    bin: &mut AngularBin,
    geom: &G,
    regions: Option<&RegionMap>,
    field_a: &FieldUnion,
    field_b: &FieldUnion,
    pairs: I,
) where
    G: Pixelization,
    I: IntoIterator<Item = PixelPair>,
{
    let resolution = resolution_at_level(field_a.level());
    // per-region accumulation needs the map to be at least as coarse as the
    // field, so pixel ancestry resolves a region for each member
    let region_of = |id: u64| -> Option<usize> {
        let map = regions?;
        if map.resolution() > resolution {
            return None;
        }
        map.find_region(geom.parent_at(id, resolution, map.resolution()))
    };

    for pair in pairs {
        if pair.separation < bin.theta_min() || pair.separation >= bin.theta_max() {
            continue;
        }
        let (pix_a, pix_b) = match (field_a.find_pixel(pair.id_a), field_b.find_pixel(pair.id_b)) {
            (Some(a), Some(b)) => (a, b),
            _ => continue,
        };
        let dweight = pix_a.weight * pix_b.weight;
        let dwtheta = pix_a.intensity * pix_b.intensity * dweight;
        bin.add_to_pixel_wtheta(dwtheta, dweight, region_of(pair.id_a), region_of(pair.id_b));
    }
}
