//! A sampled or weighted field over a pixelized footprint.
//!
//! A [`FieldUnion`] trades the exact area bookkeeping of a proper map for a
//! uniform sampling of a field (galaxy density, temperature, observational
//! depth) across its footprint: one intensity per pixel at a single
//! pixelization level, plus the unmasked fraction of the pixel. That makes
//! it the natural input for the pixel-product correlation estimator, which
//! wants over-densities: [`FieldUnion::convert_to_over_density`] re-expresses
//! every intensity relative to the field mean, and
//! [`FieldUnion::convert_from_over_density`] undoes it exactly.

use std::collections::BTreeMap;
use std::fmt;

use crate::pixel::{resolution_at_level, Footprint, Pixelization};

/// What the intensities of a field mean. Density fields must be converted
/// to over-densities before correlating; resampling sums Density/Sampled
/// intensities and averages Scalar ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Scalar,
    Density,
    Sampled,
}

/// One pixel of a field: intensity, unmasked fraction, and the number of
/// points deposited into it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldPixel {
    pub id: u64,
    pub intensity: f64,
    pub weight: f64,
    pub n_points: u64,
}

impl FieldPixel {
    pub fn new(id: u64, intensity: f64, weight: f64) -> Self {
        FieldPixel {
            id,
            intensity,
            weight,
            n_points: 0,
        }
    }
}

/// Failures while building or transforming a field union.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldError {
    /// No pixels were supplied.
    EmptyField,
    /// Pixel ids were not strictly ascending.
    UnsortedPixels,
    /// A resample target level was not coarser than the field's level.
    InvalidResampleLevel { level: u32, target: u32 },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldError::EmptyField => write!(f, "a field union requires at least one pixel"),
            FieldError::UnsortedPixels => {
                write!(f, "field pixels must be in strictly ascending id order")
            }
            FieldError::InvalidResampleLevel { level, target } => write!(
                f,
                "resample target level {target} must be coarser than the field level {level}"
            ),
        }
    }
}

impl std::error::Error for FieldError {}

/// A field sampled over a footprint at one pixelization level.
#[derive(Clone, Debug)]
pub struct FieldUnion {
    pixels: Vec<FieldPixel>,
    level: u32,
    field_type: FieldType,
    area: f64,
    total_intensity: f64,
    total_points: u64,
    mean_intensity: f64,
    calculated_mean: bool,
    over_density: bool,
}

impl FieldUnion {
    /// Build a field from pre-populated pixels (strictly ascending ids).
    pub fn from_pixels<G: Pixelization>(
        geom: &G,
        level: u32,
        pixels: Vec<FieldPixel>,
        field_type: FieldType,
    ) -> Result<FieldUnion, FieldError> {
        if pixels.is_empty() {
            return Err(FieldError::EmptyField);
        }
        if pixels.windows(2).any(|w| w[0].id >= w[1].id) {
            return Err(FieldError::UnsortedPixels);
        }

        let unit_area = geom.pixel_area(resolution_at_level(level));
        let area = pixels.iter().map(|p| p.weight * unit_area).sum();
        let total_intensity = pixels.iter().map(|p| p.intensity).sum();
        let total_points = pixels.iter().map(|p| p.n_points).sum();
        Ok(FieldUnion {
            pixels,
            level,
            field_type,
            area,
            total_intensity,
            total_points,
            mean_intensity: 0.0,
            calculated_mean: false,
            over_density: false,
        })
    }

    /// A zero-intensity field skeleton over a footprint's coverage, ready
    /// for [`FieldUnion::add_point`].
    pub fn from_footprint<G, F>(
        geom: &G,
        footprint: &F,
        level: u32,
        field_type: FieldType,
    ) -> Result<FieldUnion, FieldError>
    where
        G: Pixelization,
        F: Footprint,
    {
        let pixels = footprint
            .coverage(resolution_at_level(level))
            .into_iter()
            .map(|p| FieldPixel::new(p.id, 0.0, p.weight))
            .collect();
        FieldUnion::from_pixels(geom, level, pixels, field_type)
    }

    /// Deposit a point's intensity into the pixel containing it. Returns
    /// `false` (without side effects) when the point lies outside the field.
    pub fn add_point<G: Pixelization>(
        &mut self,
        geom: &G,
        point: &G::Point,
        intensity: f64,
    ) -> bool {
        let id = geom.pixel_at(point, resolution_at_level(self.level));
        match self.pixels.binary_search_by_key(&id, |p| p.id) {
            Ok(idx) => {
                self.pixels[idx].intensity += intensity;
                self.pixels[idx].n_points += 1;
                self.total_intensity += intensity;
                self.total_points += 1;
                self.calculated_mean = false;
                true
            }
            Err(_) => false,
        }
    }

    /// Recompute and cache the weighted mean intensity.
    pub fn calculate_mean_intensity(&mut self) {
        let mut intensity_sum = 0.0;
        let mut weight_sum = 0.0;
        for pix in &self.pixels {
            intensity_sum += pix.intensity * pix.weight;
            weight_sum += pix.weight;
        }
        self.mean_intensity = intensity_sum / weight_sum;
        self.calculated_mean = true;
    }

    /// The cached weighted mean intensity (computing it first if needed).
    pub fn mean_intensity(&mut self) -> f64 {
        if !self.calculated_mean {
            self.calculate_mean_intensity();
        }
        self.mean_intensity
    }

    /// Re-express every intensity as an over-density
    /// `(intensity - mean) / mean`. A no-op when already converted.
    pub fn convert_to_over_density(&mut self) {
        if self.over_density {
            return;
        }
        if !self.calculated_mean {
            self.calculate_mean_intensity();
        }
        for pix in &mut self.pixels {
            pix.intensity = (pix.intensity - self.mean_intensity) / self.mean_intensity;
        }
        self.over_density = true;
    }

    /// Exact inverse of [`FieldUnion::convert_to_over_density`]. A no-op
    /// when the field holds raw intensities.
    pub fn convert_from_over_density(&mut self) {
        if !self.over_density {
            return;
        }
        for pix in &mut self.pixels {
            pix.intensity = pix.intensity * self.mean_intensity + self.mean_intensity;
        }
        self.over_density = false;
    }

    /// Aggregate the field to a coarser level. Scalar intensities are
    /// weight-averaged; Density and Sampled intensities are summed. Weights
    /// average over the subdivision factor, so a fully unmasked parent keeps
    /// weight one.
    pub fn resampled<G: Pixelization>(
        &self,
        geom: &G,
        level: u32,
    ) -> Result<FieldUnion, FieldError> {
        if level >= self.level {
            return Err(FieldError::InvalidResampleLevel {
                level: self.level,
                target: level,
            });
        }

        let resolution = resolution_at_level(self.level);
        let parent_resolution = resolution_at_level(level);
        let subdivision = ((resolution / parent_resolution) as u64).pow(2) as f64;

        // (intensity numerator, weight sum, points) per parent pixel
        let mut parents: BTreeMap<u64, (f64, f64, u64)> = BTreeMap::new();
        for pix in &self.pixels {
            let parent = geom.parent_at(pix.id, resolution, parent_resolution);
            let entry = parents.entry(parent).or_insert((0.0, 0.0, 0));
            match self.field_type {
                FieldType::Scalar => entry.0 += pix.intensity * pix.weight,
                FieldType::Density | FieldType::Sampled => entry.0 += pix.intensity,
            }
            entry.1 += pix.weight;
            entry.2 += pix.n_points;
        }

        let pixels = parents
            .into_iter()
            .map(|(id, (intensity_sum, weight_sum, n_points))| {
                let intensity = match self.field_type {
                    FieldType::Scalar => intensity_sum / weight_sum,
                    FieldType::Density | FieldType::Sampled => intensity_sum,
                };
                FieldPixel {
                    id,
                    intensity,
                    weight: weight_sum / subdivision,
                    n_points,
                }
            })
            .collect();

        let mut resampled = FieldUnion::from_pixels(geom, level, pixels, self.field_type)?;
        resampled.over_density = self.over_density;
        resampled.mean_intensity = self.mean_intensity;
        Ok(resampled)
    }

    /// The pixel holding `id`, or `None` when the id is not part of the
    /// field.
    pub fn find_pixel(&self, id: u64) -> Option<&FieldPixel> {
        self.pixels
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|idx| &self.pixels[idx])
    }

    /// Intensity of the pixel holding `id`.
    pub fn intensity(&self, id: u64) -> Option<f64> {
        self.find_pixel(id).map(|p| p.intensity)
    }

    pub fn pixels(&self) -> &[FieldPixel] {
        &self.pixels
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn total_intensity(&self) -> f64 {
        self.total_intensity
    }

    pub fn n_points(&self) -> u64 {
        self.total_points
    }

    /// Mean intensity per deposited point; the raw total when no points
    /// were deposited.
    pub fn density(&self) -> f64 {
        if self.total_points == 0 {
            self.total_intensity
        } else {
            self.total_intensity / self.total_points as f64
        }
    }

    /// Deposited points per square degree.
    pub fn point_density(&self) -> f64 {
        self.total_points as f64 / self.area
    }

    pub fn is_over_density(&self) -> bool {
        self.over_density
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }
}
