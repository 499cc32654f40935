//! Partitioning a footprint into roughly equal-area contiguous regions.
//!
//! # The stripe partition
//!
//! The partitioner imposes a 1-D order on the coverage through the
//! pixelization's stripe coordinate, then walks that order greedily,
//! closing a region whenever its accumulated area crosses the next
//! equal-area breakpoint. Two refinements keep the result usable for
//! jackknife resampling:
//!
//! - stripes are first merged into maximal contiguous *sections*, and a gap
//!   in the coverage always terminates a section, so the scan never glues
//!   together sky on opposite sides of a mask;
//! - sections are re-sliced to a width of `sqrt(area / n_region)` worth of
//!   stripes, so the walk alternates scan direction often enough to produce
//!   roughly square regions rather than long thin slivers.
//!
//! The greedy close test carries a `0.75 * mean_pixel_area` guard: a region
//! is closed as soon as adding most of one more typical pixel would overshoot
//! its breakpoint, which splits the rounding error between neighboring
//! regions instead of pushing it all into the last one.
//!
//! A [`RegionMap`] is built once, read from many threads, and never mutated
//! afterwards (apart from an explicit [`RegionMap::clear`]).

use std::collections::BTreeMap;
use std::fmt;

use log::warn;

use crate::pixel::{
    CoveragePixel, Footprint, Pixelization, BASE_RESOLUTION, MAX_REGION_RESOLUTION,
    SOFT_REGION_RESOLUTION,
};

/// Failures while building a region map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegionError {
    /// The (requested or derived) resolution exceeds the absolute ceiling.
    ResolutionCeiling { resolution: u32 },
    /// Partitioning produced a region index outside `[0, n_region)`. The
    /// partition is corrupt and has been discarded.
    IllegalRegionIndex { index: usize, n_region: usize },
    /// A rebind target footprint is not covered by the reference map.
    IncompatibleFootprint,
    /// The footprint produced no coverage pixels.
    EmptyCoverage,
    /// `n_region` was zero.
    ZeroRegions,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RegionError::ResolutionCeiling { resolution } => write!(
                f,
                "region resolution {resolution} exceeds the maximum of {MAX_REGION_RESOLUTION}"
            ),
            RegionError::IllegalRegionIndex { index, n_region } => write!(
                f,
                "assigned region index {index} lies outside of [0, {n_region})"
            ),
            RegionError::IncompatibleFootprint => {
                write!(f, "footprint is not covered by the reference region map")
            }
            RegionError::EmptyCoverage => write!(f, "footprint produced an empty coverage"),
            RegionError::ZeroRegions => write!(f, "at least one region is required"),
        }
    }
}

impl std::error::Error for RegionError {}

/// A contiguous range of stripe indices. Sections never span a coverage gap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Section {
    min_stripe: u32,
    max_stripe: u32,
}

impl Section {
    fn contains(&self, stripe: u32) -> bool {
        self.min_stripe <= stripe && stripe <= self.max_stripe
    }
}

/// Mapping from coverage pixels to jackknife regions.
///
/// The uninitialized sentinel state is an empty map with `resolution == 0`
/// and `n_region == 0`; [`RegionMap::initialize`] (or
/// [`RegionMap::initialize_from_reference`]) populates it, after which the
/// map is read-only.
#[derive(Clone, Debug, Default)]
pub struct RegionMap {
    region_map: BTreeMap<u64, usize>,
    region_area: Vec<f64>,
    resolution: u32,
    n_region: usize,
}

impl RegionMap {
    pub fn new() -> Self {
        RegionMap::default()
    }

    /// Partition `footprint` into `n_region` roughly equal-area contiguous
    /// regions and index the coverage pixels by region.
    ///
    /// With `resolution == None` the pixelization scale is chosen to give
    /// each region on the order of 50 coverage pixels. Returns the region
    /// count actually used, which is clamped to the coverage size when
    /// `n_region` asks for more regions than there are pixels.
    pub fn initialize<G, F>(
        &mut self,
        geom: &G,
        footprint: &F,
        n_region: usize,
        resolution: Option<u32>,
    ) -> Result<usize, RegionError>
    where
        G: Pixelization,
        F: Footprint,
    {
        self.clear();
        if n_region == 0 {
            return Err(RegionError::ZeroRegions);
        }

        let resolution = find_resolution(geom, footprint, n_region, resolution)?;
        let coverage = footprint.coverage(resolution);
        if coverage.is_empty() {
            return Err(RegionError::EmptyCoverage);
        }

        let mut n_region = n_region;
        if n_region >= coverage.len() {
            if n_region > coverage.len() {
                warn!(
                    "requested {} regions exceeds the {} coverage pixels; clamping",
                    n_region,
                    coverage.len()
                );
            }
            // One pixel per region, in coverage order. Dead easy, but no
            // equal-area guarantee.
            n_region = coverage.len();
            let unit_area = geom.pixel_area(resolution);
            self.region_area = coverage.iter().map(|p| p.weight * unit_area).collect();
            for (region, pix) in coverage.iter().enumerate() {
                self.region_map.insert(pix.id, region);
            }
        } else {
            let stripes = unique_stripes(geom, &coverage, resolution);
            let sections = find_sections(
                &stripes,
                footprint.area(),
                n_region,
                geom.stripes_per_degree(resolution),
            );
            self.regionate(geom, &coverage, &sections, n_region, resolution);
        }

        for &region in self.region_map.values() {
            if region >= n_region {
                let err = RegionError::IllegalRegionIndex {
                    index: region,
                    n_region,
                };
                self.clear();
                return Err(err);
            }
        }

        self.resolution = resolution;
        self.n_region = n_region;
        Ok(n_region)
    }

    /// Rebind an existing partition onto a different footprint.
    ///
    /// Every coverage pixel of `footprint` (at the reference resolution) is
    /// looked up in `reference`; a single miss means the two footprints are
    /// not compatibly covered, in which case `self` is left cleared and an
    /// error is returned. On success `self` adopts the reference's
    /// resolution and region count, keyed by the new coverage.
    pub fn initialize_from_reference<G, F>(
        &mut self,
        geom: &G,
        footprint: &F,
        reference: &RegionMap,
    ) -> Result<(), RegionError>
    where
        G: Pixelization,
        F: Footprint,
    {
        self.clear();
        if !reference.is_initialized() {
            return Err(RegionError::IncompatibleFootprint);
        }

        let resolution = reference.resolution;
        let coverage = footprint.coverage(resolution);
        if coverage.is_empty() {
            return Err(RegionError::EmptyCoverage);
        }

        let unit_area = geom.pixel_area(resolution);
        let mut region_map = BTreeMap::new();
        let mut region_area = vec![0.0; reference.n_region];
        for pix in &coverage {
            match reference.find_region(pix.id) {
                Some(region) => {
                    region_map.insert(pix.id, region);
                    region_area[region] += pix.weight * unit_area;
                }
                None => return Err(RegionError::IncompatibleFootprint),
            }
        }

        self.region_map = region_map;
        self.region_area = region_area;
        self.resolution = resolution;
        self.n_region = reference.n_region;
        Ok(())
    }

    /// Greedy area-balanced assignment of coverage pixels to regions, walked
    /// in sub-section order.
    fn regionate<G: Pixelization>(
        &mut self,
        geom: &G,
        coverage: &[CoveragePixel],
        sections: &[Section],
        n_region: usize,
        resolution: u32,
    ) {
        let unit_area = geom.pixel_area(resolution);
        let total_area: f64 = coverage.iter().map(|p| p.weight * unit_area).sum();
        let mean_area = total_area / coverage.len() as f64;
        let area_break = total_area / n_region as f64;

        self.region_area = vec![0.0; n_region];
        let mut assigned_area = 0.0;
        let mut running_area = 0.0;
        let mut region = 0;

        for section in sections {
            for pix in coverage {
                if !section.contains(geom.stripe(pix.id, resolution)) {
                    continue;
                }
                let pixel_area = pix.weight * unit_area;
                let under_break =
                    assigned_area + 0.75 * mean_area < area_break * (region + 1) as f64;
                if !under_break && region < n_region - 1 {
                    // close out the current region; this pixel opens the next
                    self.region_area[region] = running_area;
                    region += 1;
                    running_area = 0.0;
                }
                assigned_area += pixel_area;
                running_area += pixel_area;
                self.region_map.insert(pix.id, region);
            }
        }
        self.region_area[region] = running_area;
    }

    /// Region index of a coverage pixel id (at the map's resolution), or
    /// `None` when the pixel lies outside the mapped footprint.
    pub fn find_region(&self, id: u64) -> Option<usize> {
        self.region_map.get(&id).copied()
    }

    /// Region index of the pixel containing `point`, or `None` outside the
    /// mapped footprint.
    pub fn find_region_at<G: Pixelization>(&self, geom: &G, point: &G::Point) -> Option<usize> {
        self.find_region(geom.pixel_at(point, self.resolution))
    }

    /// All pixel ids (at the map's resolution) assigned to `region`, in
    /// ascending id order.
    pub fn region_covering(&self, region: usize) -> Vec<u64> {
        self.region_map
            .iter()
            .filter(|&(_, &r)| r == region)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Accumulated unmasked area of `region`, or `0.0` when the region was
    /// never assigned.
    pub fn region_area(&self, region: usize) -> f64 {
        self.region_area.get(region).copied().unwrap_or(0.0)
    }

    /// Reset to the uninitialized sentinel state.
    pub fn clear(&mut self) {
        self.region_map.clear();
        self.region_area.clear();
        self.resolution = 0;
        self.n_region = 0;
    }

    pub fn n_region(&self) -> usize {
        self.n_region
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn is_initialized(&self) -> bool {
        !self.region_map.is_empty()
    }

    /// Iterate over `(pixel id, region index)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.region_map.iter().map(|(&id, &region)| (id, region))
    }
}

/// Resolve the pixelization resolution for a partition, applying the
/// auto-selection, ceiling, and footprint clamps.
fn find_resolution<G, F>(
    geom: &G,
    footprint: &F,
    n_region: usize,
    requested: Option<u32>,
) -> Result<u32, RegionError>
where
    G: Pixelization,
    F: Footprint,
{
    let mut resolution = match requested {
        Some(resolution) => resolution,
        None => {
            // shoot for ~50 pixels per region: enough to balance areas
            // without generating an enormous coverage
            let target_area = footprint.area() / (50 * n_region) as f64;
            let mut resolution = BASE_RESOLUTION;
            while geom.pixel_area(resolution) > target_area && resolution < MAX_REGION_RESOLUTION {
                resolution <<= 1;
            }
            resolution
        }
    };

    if resolution > MAX_REGION_RESOLUTION {
        return Err(RegionError::ResolutionCeiling { resolution });
    }
    if resolution > SOFT_REGION_RESOLUTION {
        warn!("regionating at resolution {resolution}; this may end badly");
    }
    if resolution > footprint.max_resolution() {
        warn!(
            "clamping region resolution {} to the footprint maximum of {}",
            resolution,
            footprint.max_resolution()
        );
        resolution = footprint.max_resolution();
    }
    Ok(resolution)
}

/// Sorted unique stripe indices present in the coverage.
fn unique_stripes<G: Pixelization>(
    geom: &G,
    coverage: &[CoveragePixel],
    resolution: u32,
) -> Vec<u32> {
    let mut stripes: Vec<u32> = coverage
        .iter()
        .map(|p| geom.stripe(p.id, resolution))
        .collect();
    stripes.sort_unstable();
    stripes.dedup();
    stripes
}

/// Merge stripes into contiguous sections, then re-slice each section into
/// sub-sections of the target width (the trailing remainder of a section
/// becomes its final, narrower sub-section).
fn find_sections(
    unique_stripes: &[u32],
    footprint_area: f64,
    n_region: usize,
    stripes_per_degree: f64,
) -> Vec<Section> {
    let mut contiguous: Vec<Section> = Vec::new();
    for &stripe in unique_stripes {
        match contiguous.last_mut() {
            Some(section) if stripe == section.max_stripe + 1 => section.max_stripe = stripe,
            _ => contiguous.push(Section {
                min_stripe: stripe,
                max_stripe: stripe,
            }),
        }
    }

    // width of a roughly square region, in stripes
    let region_length = (footprint_area / n_region as f64).sqrt();
    let width = ((region_length * stripes_per_degree) as u32).max(1);

    let mut sections: Vec<Section> = Vec::new();
    for run in &contiguous {
        let mut filled = width;
        for stripe in run.min_stripe..=run.max_stripe {
            if filled == width {
                sections.push(Section {
                    min_stripe: stripe,
                    max_stripe: stripe,
                });
                filled = 1;
            } else if let Some(section) = sections.last_mut() {
                section.max_stripe = stripe;
                filled += 1;
            }
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridFootprint, GridGeometry};
    use rand::Rng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn square_grid(n: u32) -> (GridGeometry, GridFootprint) {
        let geom = GridGeometry::new(n, n, 1.0);
        let footprint = GridFootprint::full(geom, 64);
        (geom, footprint)
    }

    #[test]
    fn regions_balanced_on_square_grid() {
        let (geom, footprint) = square_grid(8);
        let mut map = RegionMap::new();
        let n_region = map.initialize(&geom, &footprint, 4, Some(1)).unwrap();
        assert_eq!(n_region, 4);

        let mut counts = [0usize; 4];
        for (_, region) in map.iter() {
            counts[region] += 1;
        }
        assert_eq!(counts, [16, 16, 16, 16]);
        for region in 0..4 {
            assert_eq!(map.region_area(region), 16.0);
            assert_eq!(map.region_covering(region).len(), 16);
        }
    }

    #[test]
    fn partition_covers_every_pixel() {
        let (geom, footprint) = square_grid(8);
        let mut map = RegionMap::new();
        for n_region in [1, 2, 3, 5, 7, 13, 64] {
            let assigned = map.initialize(&geom, &footprint, n_region, Some(1)).unwrap();
            assert_eq!(assigned, n_region);
            assert_eq!(map.iter().count(), 64);
            assert!(map.iter().all(|(_, region)| region < n_region));
        }
    }

    #[test]
    fn one_pixel_per_region_shortcut() {
        let (geom, footprint) = square_grid(4);
        let mut map = RegionMap::new();
        let n_region = map.initialize(&geom, &footprint, 16, Some(1)).unwrap();
        assert_eq!(n_region, 16);
        for region in 0..16 {
            assert_eq!(map.region_covering(region).len(), 1);
            assert_eq!(map.region_area(region), 1.0);
        }
    }

    #[test]
    fn excess_regions_clamp_to_coverage() {
        let (geom, footprint) = square_grid(4);
        let mut map = RegionMap::new();
        let n_region = map.initialize(&geom, &footprint, 100, Some(1)).unwrap();
        assert_eq!(n_region, 16);
        assert_eq!(map.n_region(), 16);
    }

    #[test]
    fn random_weights_conserve_area() {
        let geom = GridGeometry::new(16, 8, 1.0);
        let mut footprint = GridFootprint::new(geom, 64);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x5eed);
        for y in 0..8 {
            for x in 0..16 {
                footprint.add_cell(x, y, rng.random_range(0.05..1.0));
            }
        }

        let mut map = RegionMap::new();
        let n_region = map.initialize(&geom, &footprint, 7, Some(1)).unwrap();
        assert_eq!(n_region, 7);

        let total: f64 = (0..7).map(|k| map.region_area(k)).sum();
        assert!((total - footprint.area()).abs() < 1.0e-9);
        // every region picked up some area
        assert!((0..7).all(|k| map.region_area(k) > 0.0));
    }

    #[test]
    fn sections_never_straddle_gaps() {
        // stripes 0-3 and 8-11, as from two disjoint patches
        let stripes = [0, 1, 2, 3, 8, 9, 10, 11];
        let sections = find_sections(&stripes, 16.0, 4, 1.0);
        for section in &sections {
            assert!(
                section.max_stripe <= 3 || section.min_stripe >= 8,
                "section {section:?} spans the coverage gap"
            );
        }
        // width 2, so each run splits in two
        assert_eq!(sections.len(), 4);
    }

    #[test]
    fn trailing_remainder_becomes_final_section() {
        let stripes = [0, 1, 2, 3, 4];
        let sections = find_sections(&stripes, 4.0, 1, 1.0);
        assert_eq!(
            sections,
            vec![
                Section {
                    min_stripe: 0,
                    max_stripe: 1
                },
                Section {
                    min_stripe: 2,
                    max_stripe: 3
                },
                Section {
                    min_stripe: 4,
                    max_stripe: 4
                },
            ]
        );
    }

    #[test]
    fn disjoint_footprint_partitions_cleanly() {
        let geom = GridGeometry::new(16, 4, 1.0);
        let mut footprint = GridFootprint::new(geom, 64);
        for y in 0..4 {
            for x in 0..4 {
                footprint.add_cell(x, y, 1.0);
                footprint.add_cell(x + 10, y, 1.0);
            }
        }

        let mut map = RegionMap::new();
        let n_region = map.initialize(&geom, &footprint, 2, Some(1)).unwrap();
        assert_eq!(n_region, 2);
        assert_eq!(map.iter().count(), 32);
        assert!((map.region_area(0) + map.region_area(1) - 32.0).abs() < 1.0e-9);
    }

    #[test]
    fn lookup_outside_footprint() {
        let (geom, footprint) = square_grid(8);
        let mut map = RegionMap::new();
        map.initialize(&geom, &footprint, 4, Some(1)).unwrap();

        assert!(map.find_region_at(&geom, &(3.5, 3.5)).is_some());
        // an id no coverage pixel carries
        assert!(map.find_region(9999).is_none());

        // a footprint with a hole: the hole pixel has no region
        let geom = GridGeometry::new(2, 2, 1.0);
        let mut holed = GridFootprint::new(geom, 64);
        holed.add_cell(0, 0, 1.0);
        holed.add_cell(1, 0, 1.0);
        holed.add_cell(0, 1, 1.0);
        let mut map = RegionMap::new();
        map.initialize(&geom, &holed, 3, Some(1)).unwrap();
        assert_eq!(map.find_region_at(&geom, &(1.5, 1.5)), None);
    }

    #[test]
    fn auto_resolution_targets_fifty_pixels_per_region() {
        let (geom, footprint) = square_grid(8);
        let mut map = RegionMap::new();
        // area 64, 2 regions: target pixel area 0.64; resolution 4 gives
        // 1/16 sq deg pixels, comfortably below the target
        map.initialize(&geom, &footprint, 2, None).unwrap();
        assert_eq!(map.resolution(), BASE_RESOLUTION);
    }

    #[test]
    fn resolution_ceiling_is_fatal() {
        let (geom, footprint) = square_grid(8);
        let mut map = RegionMap::new();
        let err = map
            .initialize(&geom, &footprint, 4, Some(4096))
            .unwrap_err();
        assert_eq!(err, RegionError::ResolutionCeiling { resolution: 4096 });
        assert!(!map.is_initialized());
    }

    #[test]
    fn resolution_clamps_to_footprint_maximum() {
        let geom = GridGeometry::new(8, 8, 1.0);
        let footprint = GridFootprint::full(geom, 8);
        let mut map = RegionMap::new();
        map.initialize(&geom, &footprint, 4, Some(256)).unwrap();
        assert_eq!(map.resolution(), 8);
    }

    #[test]
    fn rebind_onto_covered_footprint() {
        let (geom, footprint) = square_grid(8);
        let mut reference = RegionMap::new();
        reference.initialize(&geom, &footprint, 4, Some(1)).unwrap();

        // the left half of the grid is fully covered by the reference
        let mut half = GridFootprint::new(geom, 64);
        for y in 0..8 {
            for x in 0..4 {
                half.add_cell(x, y, 1.0);
            }
        }

        let mut rebound = RegionMap::new();
        rebound
            .initialize_from_reference(&geom, &half, &reference)
            .unwrap();
        assert_eq!(rebound.n_region(), 4);
        assert_eq!(rebound.resolution(), reference.resolution());
        assert_eq!(rebound.iter().count(), 32);

        let total: f64 = (0..4).map(|k| rebound.region_area(k)).sum();
        assert!((total - half.area()).abs() < 1.0e-9);
    }

    #[test]
    fn rebind_failure_leaves_map_cleared() {
        let geom = GridGeometry::new(8, 8, 1.0);
        let mut left = GridFootprint::new(geom, 64);
        for y in 0..8 {
            for x in 0..4 {
                left.add_cell(x, y, 1.0);
            }
        }
        let mut reference = RegionMap::new();
        reference.initialize(&geom, &left, 4, Some(1)).unwrap();

        // the full grid reaches pixels the reference never mapped
        let full = GridFootprint::full(geom, 64);
        let mut rebound = RegionMap::new();
        let err = rebound
            .initialize_from_reference(&geom, &full, &reference)
            .unwrap_err();
        assert_eq!(err, RegionError::IncompatibleFootprint);
        assert!(!rebound.is_initialized());
        assert_eq!(rebound.n_region(), 0);
        assert_eq!(rebound.resolution(), 0);
    }

    #[test]
    fn clear_resets_to_sentinel_state() {
        let (geom, footprint) = square_grid(4);
        let mut map = RegionMap::new();
        map.initialize(&geom, &footprint, 4, Some(1)).unwrap();
        assert!(map.is_initialized());

        map.clear();
        assert!(!map.is_initialized());
        assert_eq!(map.n_region(), 0);
        assert_eq!(map.resolution(), 0);
        assert_eq!(map.region_area(0), 0.0);
        assert_eq!(map.find_region(0), None);
    }

    #[test]
    fn zero_regions_rejected() {
        let (geom, footprint) = square_grid(4);
        let mut map = RegionMap::new();
        assert_eq!(
            map.initialize(&geom, &footprint, 0, Some(1)).unwrap_err(),
            RegionError::ZeroRegions
        );
    }
}
