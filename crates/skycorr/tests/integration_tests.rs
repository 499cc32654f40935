mod common;

use common::{assert_close, auto_pairs, cell_centers, cross_pairs, unit_grid};
use skycorr::{AngularCorrelation, Counter, GridFootprint, GridGeometry, PairEvent, RegionMap};

#[test]
fn log_binning_spans_the_decades() {
    let wtheta = AngularCorrelation::log_binned(0.01, 10.0, 5, 0).unwrap();
    assert_eq!(wtheta.n_bins(), 15);
    assert_close(wtheta.theta_min(), 0.01, 1.0e-12, 0.0);
    assert_close(wtheta.theta_max(), 10.0, 1.0e-12, 0.0);

    // edges are contiguous and the midpoint is the geometric mean
    for pair in wtheta.bins().windows(2) {
        assert_close(pair[0].theta_max(), pair[1].theta_min(), 1.0e-12, 0.0);
    }
    let first = &wtheta.bins()[0];
    assert_close(
        first.theta(),
        (first.theta_min() * first.theta_max()).sqrt(),
        1.0e-9,
        0.0,
    );
}

#[test]
fn binning_rejects_bad_configuration() {
    assert!(AngularCorrelation::log_binned(0.01, 10.0, 0, 0).is_err());
    assert!(AngularCorrelation::log_binned(-1.0, 10.0, 5, 0).is_err());
    assert!(AngularCorrelation::log_binned(10.0, 0.01, 5, 0).is_err());
    assert!(AngularCorrelation::linear_binned(1.0, 1.0, 4, 0).is_err());
    assert!(AngularCorrelation::linear_binned(0.0, 1.0, 0, 0).is_err());
}

#[test]
fn bin_lookup_uses_half_open_ranges() {
    let mut wtheta = AngularCorrelation::linear_binned(0.5, 4.5, 4, 0).unwrap();
    assert!(wtheta.bin_for_theta(0.4).is_none());
    assert_eq!(wtheta.bin_for_theta(0.5).map(|b| b.theta_min()), Some(0.5));
    assert_eq!(wtheta.bin_for_theta(1.5).map(|b| b.theta_min()), Some(1.5));
    // the upper limit is exclusive
    assert!(wtheta.bin_for_theta(4.5).is_none());
    assert!(wtheta.bin_for_theta_mut(2.0).is_some());
}

/// A catalog correlated against an identical "random" catalog has no excess
/// clustering: every Landy-Szalay term cancels exactly, globally and in
/// every jackknife region.
#[test]
fn identical_catalogs_have_zero_correlation() {
    let (geom, footprint) = unit_grid(8);
    let mut regions = RegionMap::new();
    regions.initialize(&geom, &footprint, 4, Some(1)).unwrap();

    let catalog = cell_centers(8);
    let mut wtheta = AngularCorrelation::linear_binned(0.5, 12.0, 5, 4).unwrap();

    // data-data: all unique pairs land somewhere in [0.5, 12)
    let accepted = wtheta.add_pairs(&geom, &regions, auto_pairs(&catalog));
    assert_eq!(accepted, 64 * 63 / 2);
    wtheta.finish_pair_stage(Counter::DataData);

    // the "random" catalog is the data catalog, so the cross stages count
    // every unordered pair twice; rescaling by two undoes that
    let dr = cross_pairs(&catalog, &catalog);
    wtheta.add_pairs(&geom, &regions, dr.clone());
    wtheta.finish_pair_stage(Counter::DataRandom);
    wtheta.add_pairs(&geom, &regions, dr);
    wtheta.finish_pair_stage(Counter::RandomData);
    wtheta.rescale_pair_counts(Counter::DataRandom, 2.0);
    wtheta.rescale_pair_counts(Counter::RandomData, 2.0);

    wtheta.add_pairs(&geom, &regions, auto_pairs(&catalog));
    wtheta.finish_pair_stage(Counter::RandomRandom);

    for bin in wtheta.bins() {
        let rr = bin.component(Counter::RandomRandom);
        if rr == 0.0 {
            continue;
        }
        assert_eq!(bin.component(Counter::DataData), rr);
        assert_eq!(bin.component(Counter::DataRandom), rr);
        assert_eq!(bin.wtheta(), 0.0);

        // the widest annuli hold so few pairs that a region's leave-two-out
        // bucket can be empty; the per-region estimate only exists otherwise
        let mut every_region_populated = true;
        for region in 0..4 {
            let rr_region = bin.component_region(Counter::RandomRandom, region).unwrap();
            if rr_region > 0.0 {
                assert_eq!(bin.wtheta_region(region), Some(0.0));
            } else {
                every_region_populated = false;
            }
        }
        if every_region_populated {
            assert_eq!(bin.mean_wtheta(), 0.0);
            assert_eq!(bin.mean_wtheta_error(), 0.0);
        }
    }
}

/// A pair with one member outside the mapped footprint contributes to the
/// global counters only; no per-region bucket moves.
#[test]
fn unmapped_member_accumulates_globally_only() {
    let geom = GridGeometry::new(8, 8, 1.0);
    let mut footprint = GridFootprint::new(geom, 64);
    for y in 0..8 {
        for x in 0..8 {
            if x != 0 || y != 0 {
                footprint.add_cell(x, y, 1.0);
            }
        }
    }
    let mut regions = RegionMap::new();
    regions.initialize(&geom, &footprint, 4, Some(1)).unwrap();
    assert_eq!(regions.find_region_at(&geom, &(0.5, 0.5)), None);

    let mut wtheta = AngularCorrelation::linear_binned(0.5, 4.0, 2, 4).unwrap();
    let event = PairEvent {
        a: (0.5, 0.5), // inside the hole
        b: (3.5, 0.5),
        separation: 3.0,
        weight: 2.5,
    };
    assert_eq!(wtheta.add_pairs(&geom, &regions, [event]), 1);

    let bin = wtheta.bin_for_theta(3.0).unwrap();
    assert_eq!(bin.pair_weight(), 2.5);
    assert_eq!(bin.pair_counts(), 1);
    for region in 0..4 {
        assert_eq!(bin.pair_weight_region(region), Some(0.0));
        assert_eq!(bin.pair_counts_region(region), Some(0));
    }
}

/// Clustered data against a uniform random catalog produces a positive
/// small-scale correlation with usable jackknife aggregates.
#[test]
fn clustered_catalog_shows_small_scale_excess() {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    let (geom, footprint) = unit_grid(8);
    let mut regions = RegionMap::new();
    regions.initialize(&geom, &footprint, 4, Some(1)).unwrap();

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0xa57f0);
    // data: tight clumps of five points around a handful of centers
    let mut data = Vec::new();
    for _ in 0..12 {
        let cx = rng.random_range(0.5..7.5);
        let cy = rng.random_range(0.5..7.5);
        for _ in 0..5 {
            data.push((
                cx + rng.random_range(-0.05..0.05),
                cy + rng.random_range(-0.05..0.05),
            ));
        }
    }
    // random: uniform doublets at a fixed 0.05-degree split, so the
    // small-scale annulus is guaranteed a nonzero random-random count
    let mut random = Vec::new();
    for _ in 0..30 {
        let x = rng.random_range(0.0..7.9);
        let y = rng.random_range(0.0..8.0);
        random.push((x, y));
        random.push((x + 0.05, y));
    }

    let mut wtheta = AngularCorrelation::log_binned(0.01, 8.0, 3, 4).unwrap();
    wtheta.add_pairs(&geom, &regions, auto_pairs(&data));
    wtheta.finish_pair_stage(Counter::DataData);
    wtheta.add_pairs(&geom, &regions, cross_pairs(&data, &random));
    wtheta.finish_pair_stage(Counter::DataRandom);
    wtheta.add_pairs(&geom, &regions, cross_pairs(&random, &data));
    wtheta.finish_pair_stage(Counter::RandomData);
    wtheta.add_pairs(&geom, &regions, auto_pairs(&random));
    wtheta.finish_pair_stage(Counter::RandomRandom);
    // cross stages hold N^2 pairs against the auto stages' N(N-1)/2
    wtheta.rescale_pair_counts(Counter::DataRandom, 2.0);
    wtheta.rescale_pair_counts(Counter::RandomData, 2.0);

    // intra-clump separations pile up below 0.15 degrees, where the random
    // catalog holds only its planted doublets: a strong positive excess
    let small_scale = wtheta.bin_for_theta(0.05).unwrap();
    assert!(small_scale.component(Counter::DataData) > 0.0);
    assert!(small_scale.component(Counter::RandomRandom) >= 30.0);
    assert!(small_scale.wtheta() > 1.0);
    assert!(small_scale.wtheta_error() > 0.0);
}
