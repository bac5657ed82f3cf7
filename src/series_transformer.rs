use crate::attributes::{self, AttributeError};
use crate::config::BolusConfig;
use crate::mask::SliceMasks;
use crate::series::{CtSlice, Rescale, Series};
use crate::uid::UidRewriter;

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileDicomObject, FileMetaTable, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use dicom_dictionary_std::tags;
use ndarray::{Array2, Zip};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error("Failed to rebuild file meta group: {0}")]
    Meta(#[from] dicom::object::meta::Error),

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: dicom::object::WriteError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a merged mask offset is combined with the CT values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BurnIn {
    /// Offset of a voxel covered by exactly one unmerged ROI
    pub raw_mask: f64,
    pub threshold_hu: f64,
}

impl BurnIn {
    /// `raw_mask` is the stored value whose HU equals `config.hu_mask`.
    pub fn new(config: &BolusConfig, rescale: Rescale) -> Self {
        Self {
            raw_mask: rescale.to_raw(config.hu_mask),
            threshold_hu: config.threshold_hu,
        }
    }
}

/// Add `mask` to the HU values of `pixels`.
///
/// Voxels carrying exactly one burn offset whose sum would exceed the
/// threshold are set to the bolus HU instead.
pub fn apply_mask(
    pixels: &Array2<u16>,
    mask: &Array2<f64>,
    rescale: Rescale,
    burn_in: BurnIn,
) -> Array2<u16> {
    let bolus_hu = rescale.to_hu(burn_in.raw_mask);
    Zip::from(pixels).and(mask).map_collect(|&raw, &offset| {
        let combined = rescale.to_hu(raw as f64) + offset;
        let single_offset = offset != 0.0 && offset == burn_in.raw_mask;
        let hu = if single_offset && combined > burn_in.threshold_hu {
            bolus_hu
        } else {
            combined
        };
        rescale.to_raw(hu).round().clamp(0.0, u16::MAX as f64) as u16
    })
}

/// A CT slice persisted by [`SeriesTransformer::write_series`].
#[derive(Clone, Debug)]
pub struct WrittenSlice {
    /// 1-based position in the sorted series
    pub position: usize,
    pub path: PathBuf,
    pub sop_instance_uid: String,
    pub masked: bool,
}

pub struct SeriesTransformer {
    config: BolusConfig,
    rewriter: UidRewriter,
    burn_in: BurnIn,
}

impl SeriesTransformer {
    pub fn new(config: &BolusConfig, burn_in: BurnIn) -> Self {
        Self {
            rewriter: UidRewriter::new(&config.uid_prefix, config.suffix_length),
            config: config.clone(),
            burn_in,
        }
    }

    /// Derive one slice: burn in `mask` if given and rewrite the identifiers
    /// that make the object a new instance of a new series.
    ///
    /// Study Instance UID and Frame of Reference UID are kept so the result
    /// stays registered with the original study.
    pub fn transform_slice(
        &self,
        slice: &CtSlice,
        mask: Option<&Array2<f64>>,
    ) -> Result<FileDicomObject<InMemDicomObject>, TransformError> {
        let mut dataset = slice.object.clone().into_inner();
        let mut transfer_syntax = slice.object.meta().transfer_syntax().to_owned();

        if let Some(mask) = mask {
            let encapsulated = dataset
                .get(tags::PIXEL_DATA)
                .is_some_and(|e| e.value().primitive().is_none());
            let pixels = apply_mask(&slice.pixels, mask, slice.rescale, self.burn_in);
            dataset.put(DataElement::new(
                tags::PIXEL_DATA,
                VR::OW,
                PrimitiveValue::U16(pixels.iter().copied().collect()),
            ));
            // Burned pixels are always stored native
            if encapsulated {
                tracing::debug!(uid = %slice.sop_instance_uid, "re-encoding slice uncompressed");
                transfer_syntax = EXPLICIT_VR_LITTLE_ENDIAN.uid().to_owned();
            }
        }

        let sop_instance_uid = self.rewriter.rewrite(&slice.sop_instance_uid);
        attributes::put_uid(&mut dataset, tags::SOP_INSTANCE_UID, &sop_instance_uid);

        let series_uid =
            attributes::string(&dataset, tags::SERIES_INSTANCE_UID, "SeriesInstanceUID")?;
        attributes::put_uid(
            &mut dataset,
            tags::SERIES_INSTANCE_UID,
            &self.rewriter.rewrite(&series_uid),
        );

        if let Some(event_uid) = attributes::opt_string(&dataset, tags::IRRADIATION_EVENT_UID) {
            attributes::put_uid(
                &mut dataset,
                tags::IRRADIATION_EVENT_UID,
                &self.rewriter.rewrite(&event_uid),
            );
        }

        if dataset.get(tags::REFERENCED_IMAGE_SEQUENCE).is_some() {
            let references = rewrite_references(
                attributes::items(&dataset, tags::REFERENCED_IMAGE_SEQUENCE),
                &self.rewriter,
            );
            attributes::put_sequence(&mut dataset, tags::REFERENCED_IMAGE_SEQUENCE, references);
        }

        let media_uid = self
            .rewriter
            .rewrite(slice.object.meta().media_storage_sop_instance_uid());
        rebuild_meta(dataset, slice.object.meta(), &media_uid, &transfer_syntax)
    }

    /// Transform every slice of `series` and write it to `output_dir`,
    /// named after its position in the sorted series.
    pub fn write_series(
        &self,
        series: &Series,
        masks: &SliceMasks,
        output_dir: &Path,
    ) -> Result<Vec<WrittenSlice>, TransformError> {
        fs::create_dir_all(output_dir)?;

        let written: Vec<WrittenSlice> = series
            .slices()
            .par_iter()
            .enumerate()
            .map(|(i, slice)| {
                let mask = masks.get(&slice.sop_instance_uid);
                let object = self.transform_slice(slice, mask)?;
                let sop_instance_uid =
                    attributes::string(&object, tags::SOP_INSTANCE_UID, "SOPInstanceUID")?;

                let path = output_dir.join(self.config.ct_file_name(i + 1));
                object
                    .write_to_file(&path)
                    .map_err(|source| TransformError::Write {
                        path: path.clone(),
                        source,
                    })?;

                Ok(WrittenSlice {
                    position: i + 1,
                    path,
                    sop_instance_uid,
                    masked: mask.is_some(),
                })
            })
            .collect::<Result<_, TransformError>>()?;

        tracing::info!(
            slices = written.len(),
            masked = written.iter().filter(|s| s.masked).count(),
            output = %output_dir.display(),
            "wrote synthetic CT series"
        );
        Ok(written)
    }
}

/// Copies of `items` with their Referenced SOP Instance UID rewritten.
pub(crate) fn rewrite_references(
    items: &[InMemDicomObject],
    rewriter: &UidRewriter,
) -> Vec<InMemDicomObject> {
    items
        .iter()
        .map(|item| {
            let mut item = item.clone();
            if let Some(uid) = attributes::opt_string(&item, tags::REFERENCED_SOP_INSTANCE_UID) {
                attributes::put_uid(
                    &mut item,
                    tags::REFERENCED_SOP_INSTANCE_UID,
                    &rewriter.rewrite(&uid),
                );
            }
            item
        })
        .collect()
}

/// Attach a file meta group equal to `source` except for the instance UID
/// and the transfer syntax.
pub(crate) fn rebuild_meta(
    dataset: InMemDicomObject,
    source: &FileMetaTable,
    media_storage_sop_instance_uid: &str,
    transfer_syntax: &str,
) -> Result<FileDicomObject<InMemDicomObject>, TransformError> {
    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(transfer_syntax)
        .media_storage_sop_class_uid(source.media_storage_sop_class_uid())
        .media_storage_sop_instance_uid(media_storage_sop_instance_uid)
        .build()?;
    Ok(dataset.with_exact_meta(meta))
}
