use crate::coords::{mm_to_voxel, planar_mm};
use crate::raster::{dilate, fill_polygon, polygon_area};
use crate::series::Series;
use crate::structure::{Contour, StructureError, roi_contours};

use dicom::object::{InMemDicomObject, open_file};
use ndarray::{Array2, Zip};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaskError {
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// Intensity offset per slice, keyed by SOP Instance UID.
pub type SliceMasks = HashMap<String, Array2<f64>>;

/// Per-ROI masks, keyed by ROI number.
pub type RoiMasks = BTreeMap<i32, SliceMasks>;

/// Discrepancy between rasterized and exact contour area, in percent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FidelityStats {
    pub median: f64,
    pub p95: f64,
    pub max: f64,
}

#[derive(Clone, Debug)]
pub struct MaskOutput {
    pub masks: RoiMasks,
    /// `None` when no slice had any mask or polygon area
    pub fidelity: Option<FidelityStats>,
}

/// Voxel grid the contours are rasterized into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskGeometry {
    pub origin: [f64; 3],
    /// (x, y) in mm
    pub spacing: (f64, f64),
    /// (rows, columns)
    pub shape: (usize, usize),
}

impl MaskGeometry {
    pub fn from_series(series: &Series) -> Self {
        let (_, rows, columns) = series.dim();
        Self {
            origin: series.origin(),
            spacing: series.pixel_spacing(),
            shape: (rows, columns),
        }
    }

    fn pixel_area(&self) -> f64 {
        self.spacing.0 * self.spacing.1
    }
}

/// Rasterized coverage of one slice, before the burn value is applied.
struct SliceCoverage {
    mask: Array2<bool>,
    polygon_area: f64,
}

pub struct MaskBuilder {
    geometry: MaskGeometry,
    margin: usize,
    burn_value: f64,
}

impl MaskBuilder {
    /// * `margin` - dilation of every ROI mask, in voxels
    /// * `burn_value` - offset written into covered voxels
    pub fn new(geometry: MaskGeometry, margin: usize, burn_value: f64) -> Self {
        Self {
            geometry,
            margin,
            burn_value,
        }
    }

    pub fn build_from_file(
        &self,
        rtstruct_path: impl AsRef<Path>,
        roi_numbers: &[i32],
    ) -> Result<MaskOutput, MaskError> {
        let rtstruct = open_file(rtstruct_path.as_ref())?;
        self.build(&rtstruct, roi_numbers)
    }

    /// Rasterize the contours of each ROI in `roi_numbers` into per-slice
    /// offset masks.
    ///
    /// Contours on the same slice are OR-ed, then grown by the margin.
    /// An ROI without contours yields an empty slice map.
    pub fn build(
        &self,
        rtstruct: &InMemDicomObject,
        roi_numbers: &[i32],
    ) -> Result<MaskOutput, MaskError> {
        let mut masks = RoiMasks::new();
        let mut differences = Vec::new();

        for &roi in roi_numbers {
            let coverage = self.rasterize_roi(&roi_contours(rtstruct, roi)?, roi)?;
            let mut slice_masks = SliceMasks::with_capacity(coverage.len());

            for (uid, slice) in coverage {
                let mask_area = slice.mask.iter().filter(|&&v| v).count() as f64
                    * self.geometry.pixel_area();
                if let Some(diff) = relative_difference(slice.polygon_area, mask_area) {
                    differences.push(diff);
                }
                let burn_value = self.burn_value;
                slice_masks.insert(uid, slice.mask.mapv(|v| if v { burn_value } else { 0.0 }));
            }

            tracing::debug!(roi, slices = slice_masks.len(), "built ROI mask");
            masks.insert(roi, slice_masks);
        }

        let fidelity = summarize_fidelity(&differences);
        if let Some(stats) = &fidelity {
            tracing::info!(
                median = stats.median,
                p95 = stats.p95,
                max = stats.max,
                "rasterization fidelity (% area difference)"
            );
        }

        Ok(MaskOutput { masks, fidelity })
    }

    fn rasterize_roi(
        &self,
        contours: &[Contour],
        roi: i32,
    ) -> Result<BTreeMap<String, SliceCoverage>, MaskError> {
        let rasterized: Vec<(String, Array2<bool>, f64)> = contours
            .par_iter()
            .map(|contour| -> Result<(String, Array2<bool>, f64), StructureError> {
                let to_error = |source| StructureError::ContourData { roi, source };
                let voxels = mm_to_voxel(
                    &contour.points_mm,
                    self.geometry.origin,
                    self.geometry.spacing,
                )
                .map_err(to_error)?;
                let area = polygon_area(&planar_mm(&contour.points_mm).map_err(to_error)?);
                if area == 0.0 {
                    tracing::warn!(roi, uid = %contour.image_uid, "degenerate contour has no area");
                }
                Ok((
                    contour.image_uid.clone(),
                    fill_polygon(&voxels, self.geometry.shape),
                    area,
                ))
            })
            .collect::<Result<_, _>>()?;

        let mut coverage: BTreeMap<String, SliceCoverage> = BTreeMap::new();
        for (uid, mask, area) in rasterized {
            match coverage.get_mut(&uid) {
                Some(slice) => {
                    Zip::from(&mut slice.mask)
                        .and(&mask)
                        .for_each(|acc, &v| *acc |= v);
                    slice.polygon_area += area;
                }
                None => {
                    coverage.insert(
                        uid,
                        SliceCoverage {
                            mask,
                            polygon_area: area,
                        },
                    );
                }
            }
        }

        if self.margin > 0 {
            for slice in coverage.values_mut() {
                slice.mask = dilate(&slice.mask, self.margin);
            }
        }

        Ok(coverage)
    }
}

fn relative_difference(polygon_area: f64, mask_area: f64) -> Option<f64> {
    let total = polygon_area + mask_area;
    (total > 0.0).then(|| (polygon_area - mask_area).abs() * 100.0 / (total / 2.0))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Linear interpolation between closest ranks of an ascending slice.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = q.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

/// Median, 95th percentile and maximum, rounded to 3 decimals.
pub fn summarize_fidelity(differences: &[f64]) -> Option<FidelityStats> {
    let mut sorted = differences.to_vec();
    sorted.sort_by(f64::total_cmp);

    Some(FidelityStats {
        median: round3(percentile(&sorted, 50.0)?),
        p95: round3(percentile(&sorted, 95.0)?),
        max: round3(*sorted.last()?),
    })
}

/// Sum the masks of every ROI into one mask per slice.
///
/// Overlapping ROIs accumulate; the inputs are left untouched.
pub fn merge_masks(masks: &RoiMasks) -> SliceMasks {
    let mut merged = SliceMasks::new();
    for slice_masks in masks.values() {
        for (uid, mask) in slice_masks {
            merged
                .entry(uid.clone())
                .and_modify(|acc| *acc += mask)
                .or_insert_with(|| mask.clone());
        }
    }
    merged
}
