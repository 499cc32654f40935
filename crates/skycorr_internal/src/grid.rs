//! A flat rectangular pixelization for exercising the partition and
//! correlation machinery without a sphere library.
//!
//! [`GridGeometry`] carves a rectangle of sky into `nx0 x ny0` square base
//! cells of a fixed angular size; at resolution `r` each base cell subdivides
//! into `r x r` subcells. Pixel ids are row-major, the stripe coordinate is
//! the column index, and areas are exact (no projection distortion), which
//! makes partition outcomes easy to predict in tests. It is not a substitute
//! for a proper spherical scheme, but it implements the full
//! [`Pixelization`]/[`Footprint`] seam.

use std::collections::BTreeMap;

use crate::pixel::{CoveragePixel, Footprint, Pixelization};

/// Flat grid pixelization: square cells, column stripes, exact areas.
#[derive(Clone, Copy, Debug)]
pub struct GridGeometry {
    nx0: u32,
    ny0: u32,
    deg_per_cell: f64,
}

impl GridGeometry {
    /// A grid of `nx0 x ny0` base cells, each `deg_per_cell` degrees on a
    /// side at resolution 1.
    pub fn new(nx0: u32, ny0: u32, deg_per_cell: f64) -> Self {
        GridGeometry {
            nx0,
            ny0,
            deg_per_cell,
        }
    }

    /// Number of pixels across the scan direction at `resolution`.
    pub fn nx(&self, resolution: u32) -> u32 {
        self.nx0 * resolution
    }

    /// Number of pixels along the other axis at `resolution`.
    pub fn ny(&self, resolution: u32) -> u32 {
        self.ny0 * resolution
    }

    fn cell_size(&self, resolution: u32) -> f64 {
        self.deg_per_cell / resolution as f64
    }

    /// (x, y) indices of a pixel id at `resolution`.
    pub fn pixel_xy(&self, id: u64, resolution: u32) -> (u32, u32) {
        let nx = self.nx(resolution) as u64;
        ((id % nx) as u32, (id / nx) as u32)
    }

    /// Pixel id from (x, y) indices at `resolution`.
    pub fn pixel_id(&self, x: u32, y: u32, resolution: u32) -> u64 {
        y as u64 * self.nx(resolution) as u64 + x as u64
    }
}

impl Pixelization for GridGeometry {
    /// Coordinates in degrees, `(0, 0)` at the grid origin.
    type Point = (f64, f64);

    fn pixel_at(&self, point: &(f64, f64), resolution: u32) -> u64 {
        let cell = self.cell_size(resolution);
        let clamp = |v: f64, n: u32| -> u32 {
            let idx = (v / cell).floor();
            if idx < 0.0 {
                0
            } else if idx >= n as f64 {
                n - 1
            } else {
                idx as u32
            }
        };
        let x = clamp(point.0, self.nx(resolution));
        let y = clamp(point.1, self.ny(resolution));
        self.pixel_id(x, y, resolution)
    }

    fn parent_at(&self, id: u64, resolution: u32, parent_resolution: u32) -> u64 {
        let (x, y) = self.pixel_xy(id, resolution);
        let factor = resolution / parent_resolution;
        self.pixel_id(x / factor, y / factor, parent_resolution)
    }

    fn stripe(&self, id: u64, resolution: u32) -> u32 {
        self.pixel_xy(id, resolution).0
    }

    fn pixel_area(&self, resolution: u32) -> f64 {
        let cell = self.cell_size(resolution);
        cell * cell
    }

    fn stripes_per_degree(&self, resolution: u32) -> f64 {
        resolution as f64 / self.deg_per_cell
    }
}

/// A footprint on a [`GridGeometry`]: a weighted subset of the base cells.
///
/// Cells that are never added are holes; the coverage at finer resolutions
/// subdivides each base cell and carries its weight down unchanged.
#[derive(Clone, Debug)]
pub struct GridFootprint {
    geometry: GridGeometry,
    cells: BTreeMap<u64, f64>,
    max_resolution: u32,
}

impl GridFootprint {
    /// An empty footprint. Populate it with [`GridFootprint::add_cell`].
    pub fn new(geometry: GridGeometry, max_resolution: u32) -> Self {
        GridFootprint {
            geometry,
            cells: BTreeMap::new(),
            max_resolution,
        }
    }

    /// The full grid at unit weight.
    pub fn full(geometry: GridGeometry, max_resolution: u32) -> Self {
        let mut footprint = GridFootprint::new(geometry, max_resolution);
        for y in 0..geometry.ny(1) {
            for x in 0..geometry.nx(1) {
                footprint.add_cell(x, y, 1.0);
            }
        }
        footprint
    }

    /// Add (or overwrite) the base cell at `(x, y)` with an unmasked
    /// fraction of `weight`.
    pub fn add_cell(&mut self, x: u32, y: u32, weight: f64) {
        self.cells.insert(self.geometry.pixel_id(x, y, 1), weight);
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }
}

impl Footprint for GridFootprint {
    fn coverage(&self, resolution: u32) -> Vec<CoveragePixel> {
        let mut pixels = Vec::with_capacity(self.cells.len() * (resolution * resolution) as usize);
        for (&cell_id, &weight) in &self.cells {
            let (cx, cy) = self.geometry.pixel_xy(cell_id, 1);
            for dy in 0..resolution {
                for dx in 0..resolution {
                    let id = self.geometry.pixel_id(
                        cx * resolution + dx,
                        cy * resolution + dy,
                        resolution,
                    );
                    pixels.push(CoveragePixel::new(id, weight));
                }
            }
        }
        pixels.sort_by_key(|p| p.id);
        pixels
    }

    fn area(&self) -> f64 {
        let cell_area = self.geometry.pixel_area(1);
        self.cells.values().map(|w| w * cell_area).sum()
    }

    fn max_resolution(&self) -> u32 {
        self.max_resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_stripes_and_parents() {
        let geom = GridGeometry::new(4, 2, 1.0);

        assert_eq!(geom.pixel_at(&(2.5, 1.5), 1), 6);
        assert_eq!(geom.stripe(6, 1), 2);

        // resolution 2 doubles both axes
        assert_eq!(geom.pixel_at(&(2.5, 1.5), 2), 29);
        assert_eq!(geom.stripe(29, 2), 5);
        assert_eq!(geom.parent_at(29, 2, 1), 6);

        // points outside the grid clamp to the boundary pixel
        assert_eq!(geom.pixel_at(&(-1.0, 0.5), 1), 0);
        assert_eq!(geom.pixel_at(&(100.0, 1.5), 1), 7);
    }

    #[test]
    fn coverage_is_sorted_and_weighted() {
        let geom = GridGeometry::new(2, 2, 1.0);
        let mut footprint = GridFootprint::new(geom, 8);
        footprint.add_cell(0, 0, 1.0);
        footprint.add_cell(1, 1, 0.5);

        let coverage = footprint.coverage(2);
        assert_eq!(coverage.len(), 8);
        assert!(coverage.windows(2).all(|w| w[0].id < w[1].id));

        let total: f64 = coverage.iter().map(|p| p.weight).sum();
        assert_eq!(total, 6.0);
        assert_eq!(footprint.area(), 1.5);
    }

    #[test]
    fn area_scales_with_cell_size() {
        let geom = GridGeometry::new(8, 8, 0.5);
        assert_eq!(geom.pixel_area(1), 0.25);
        assert_eq!(geom.pixel_area(2), 0.0625);
        assert_eq!(geom.stripes_per_degree(4), 8.0);

        let footprint = GridFootprint::full(geom, 16);
        assert_eq!(footprint.area(), 16.0);
    }
}
