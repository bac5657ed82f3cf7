//! End-to-end runs over a pair of storage directories.

use crate::config::{BolusConfig, ConfigError, RunPaths};
use crate::enums::{InterpretedType, SortBy};
use crate::integrity::{self, IntegrityError};
use crate::mask::{FidelityStats, MaskBuilder, MaskError, MaskGeometry, merge_masks};
use crate::rtstruct_transformer::StructureSetTransformer;
use crate::series::SeriesError;
use crate::series_loader::SeriesLoader;
use crate::series_transformer::{BurnIn, SeriesTransformer, TransformError};
use crate::structure::{StructureError, StructureSet, parse_structures};
use crate::uid::UidRewriter;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No ROI selected")]
    NoRoiSelected,

    #[error("ROI {0} is not defined in the structure set")]
    UnknownRoi(i32),

    #[error("Input and output directory are the same: {}", .0.display())]
    SameDirectory(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, Serialize)]
pub struct GenerationReport {
    /// Rasterization error in percent, absent when no contour had area
    pub fidelity: Option<FidelityStats>,
    pub slices: usize,
    /// Rewritten UIDs of the slices that received a mask
    pub mask_uids: BTreeSet<String>,
    /// Rewritten UID to 0-based position in the written series
    pub uid_to_index: BTreeMap<String, usize>,
    pub rtstruct: PathBuf,
}

#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    pub changed: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    /// 1-based positions of the changed slices, e.g. `"3-5, 9"`
    pub changed_ranges: String,
    pub unchanged_ranges: String,
    /// The changed set equals the expected one, if one was given
    pub consistent: bool,
}

/// Structures of the input structure set, mapped onto the input series.
pub fn list_structures(input_dir: &Path) -> Result<StructureSet, PipelineError> {
    let series = SeriesLoader::load_from_directory(input_dir, SortBy::ImagePositionPatient)?;
    let (_, rtstruct) = SeriesLoader::load_rtstruct(input_dir)?;
    Ok(parse_structures(
        &rtstruct,
        &series.uid_to_index(),
        series.origin(),
        series.pixel_spacing(),
    )?)
}

/// Burn the ROIs `roi_numbers` into the input series and write the derived
/// series and structure set to the output directory.
///
/// Stale `.dcm` files in the output directory are removed first. A failed
/// run leaves the output directory in an unspecified state.
pub fn generate(
    paths: &RunPaths,
    config: &BolusConfig,
    roi_numbers: &[i32],
) -> Result<GenerationReport, PipelineError> {
    config.validate()?;
    if roi_numbers.is_empty() {
        return Err(PipelineError::NoRoiSelected);
    }

    let series = SeriesLoader::load_from_directory(&paths.input_dir, SortBy::ImagePositionPatient)?;
    let (rtstruct_path, rtstruct) = SeriesLoader::load_rtstruct(&paths.input_dir)?;
    tracing::info!(
        slices = series.len(),
        rtstruct = %rtstruct_path.display(),
        "loaded input"
    );

    let structures = parse_structures(
        &rtstruct,
        &series.uid_to_index(),
        series.origin(),
        series.pixel_spacing(),
    )?;
    for &roi in roi_numbers {
        let structure = structures
            .structures
            .iter()
            .find(|s| s.number == roi)
            .ok_or(PipelineError::UnknownRoi(roi))?;
        if structure.interpreted_type != InterpretedType::Bolus {
            tracing::warn!(roi, name = %structure.name, "selected ROI is not a bolus");
        }
    }

    let burn_in = BurnIn::new(config, series.uniform_rescale()?);
    let masks = MaskBuilder::new(
        MaskGeometry::from_series(&series),
        config.margin,
        burn_in.raw_mask,
    )
    .build(&rtstruct, roi_numbers)?;
    let merged = merge_masks(&masks.masks);

    clear_output_dir(&paths.input_dir, &paths.output_dir)?;

    let written =
        SeriesTransformer::new(config, burn_in).write_series(&series, &merged, &paths.output_dir)?;
    let rtstruct_out = paths.output_dir.join(&config.rtstruct_file_name);
    StructureSetTransformer::new(UidRewriter::new(&config.uid_prefix, config.suffix_length))
        .write(&rtstruct, roi_numbers, &rtstruct_out)?;

    Ok(GenerationReport {
        fidelity: masks.fidelity,
        slices: written.len(),
        mask_uids: written
            .iter()
            .filter(|s| s.masked)
            .map(|s| s.sop_instance_uid.clone())
            .collect(),
        uid_to_index: written
            .iter()
            .map(|s| (s.sop_instance_uid.clone(), s.position - 1))
            .collect(),
        rtstruct: rtstruct_out,
    })
}

/// Compare the derived series in the output directory with the input series.
///
/// Slices are paired by instance number. Ranges are 1-based positions along
/// the slice normal, the order [`generate`] numbers its output files in.
///
/// `expected_changed` holds the rewritten UIDs that are supposed to differ,
/// usually [`GenerationReport::mask_uids`].
pub fn validate(
    paths: &RunPaths,
    expected_changed: Option<&BTreeSet<String>>,
) -> Result<ValidationReport, PipelineError> {
    let original = SeriesLoader::load_from_directory(&paths.input_dir, SortBy::InstanceNumber)?;
    let modified =
        SeriesLoader::load_from_directory(&paths.output_dir, SortBy::ImagePositionPatient)?;
    let report = integrity::compare(&original, &modified)?;

    let index = modified.uid_to_index();
    let positions = |uids: &BTreeSet<String>| {
        let mut positions: Vec<usize> = uids
            .iter()
            .filter_map(|uid| index.get(uid).map(|i| i + 1))
            .collect();
        positions.sort_unstable();
        integrity::summarize(&positions)
    };

    let consistent = expected_changed.is_none_or(|expected| *expected == report.changed);
    if !consistent {
        tracing::warn!(
            changed = report.changed.len(),
            "changed slices differ from the masked slices"
        );
    }

    Ok(ValidationReport {
        changed_ranges: positions(&report.changed),
        unchanged_ranges: positions(&report.unchanged),
        changed: report.changed,
        unchanged: report.unchanged,
        consistent,
    })
}

fn clear_output_dir(input_dir: &Path, output_dir: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(output_dir)?;
    if fs::canonicalize(input_dir)? == fs::canonicalize(output_dir)? {
        return Err(PipelineError::SameDirectory(output_dir.to_path_buf()));
    }

    let mut removed = 0;
    for entry in fs::read_dir(output_dir)? {
        let path = entry?.path();
        let is_dcm = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"));
        if is_dcm && path.is_file() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::debug!(removed, output = %output_dir.display(), "cleared stale output");
    }
    Ok(())
}
