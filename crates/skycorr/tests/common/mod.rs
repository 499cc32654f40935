#![allow(dead_code)] // not every test binary uses every helper

use skycorr::{GridFootprint, GridGeometry, PairEvent};

pub type Point = (f64, f64);

/// Flat-sky separation in degrees, which is exact on the grid geometry.
pub fn separation(a: Point, b: Point) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Every unique pair within one catalog, unit weight. This brute-force walk
/// plays the role of the external pair finder in tests.
pub fn auto_pairs(points: &[Point]) -> Vec<PairEvent<Point>> {
    let mut events = Vec::new();
    for (i, &a) in points.iter().enumerate() {
        for &b in &points[i + 1..] {
            events.push(PairEvent {
                a,
                b,
                separation: separation(a, b),
                weight: 1.0,
            });
        }
    }
    events
}

/// Every ordered pair between two catalogs, unit weight.
pub fn cross_pairs(points_a: &[Point], points_b: &[Point]) -> Vec<PairEvent<Point>> {
    let mut events = Vec::new();
    for &a in points_a {
        for &b in points_b {
            events.push(PairEvent {
                a,
                b,
                separation: separation(a, b),
                weight: 1.0,
            });
        }
    }
    events
}

/// The centers of every base cell of an `n x n` unit grid.
pub fn cell_centers(n: u32) -> Vec<Point> {
    let mut points = Vec::with_capacity((n * n) as usize);
    for y in 0..n {
        for x in 0..n {
            points.push((x as f64 + 0.5, y as f64 + 0.5));
        }
    }
    points
}

pub fn unit_grid(n: u32) -> (GridGeometry, GridFootprint) {
    let geom = GridGeometry::new(n, n, 1.0);
    let footprint = GridFootprint::full(geom, 64);
    (geom, footprint)
}

pub fn assert_close(actual: f64, expected: f64, rtol: f64, atol: f64) {
    let bound = atol + rtol * expected.abs();
    assert!(
        (actual - expected).abs() <= bound,
        "{actual} differs from {expected} by more than rtol={rtol}, atol={atol}"
    );
}
