use crate::attributes;
use crate::enums::InterpretedType;
use crate::series_transformer::{TransformError, rebuild_meta, rewrite_references};
use crate::structure::referenced_roi_number;
use crate::uid::UidRewriter;

use dicom::core::{Tag, VR};
use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom_dictionary_std::tags;
use std::path::Path;

/// Derives the structure set of a synthetic series.
///
/// Every reference into the CT series is rewritten with the same
/// [`UidRewriter`] the series was written with, so contours keep resolving
/// to the derived slices. The study reference is preserved.
pub struct StructureSetTransformer {
    rewriter: UidRewriter,
}

impl StructureSetTransformer {
    pub fn new(rewriter: UidRewriter) -> Self {
        Self { rewriter }
    }

    /// Build the derived structure set; `source` is left untouched.
    ///
    /// ROIs in `consumed` are reclassified as `CONTROL` and lose their
    /// physical properties.
    pub fn transform(
        &self,
        source: &FileDicomObject<InMemDicomObject>,
        consumed: &[i32],
    ) -> Result<FileDicomObject<InMemDicomObject>, TransformError> {
        let mut dataset = source.clone().into_inner();

        let sop_instance_uid = self.rewriter.rewrite(&attributes::string(
            &dataset,
            tags::SOP_INSTANCE_UID,
            "SOPInstanceUID",
        )?);
        attributes::put_uid(&mut dataset, tags::SOP_INSTANCE_UID, &sop_instance_uid);

        let series_uid =
            attributes::string(&dataset, tags::SERIES_INSTANCE_UID, "SeriesInstanceUID")?;
        attributes::put_uid(
            &mut dataset,
            tags::SERIES_INSTANCE_UID,
            &self.rewriter.rewrite(&series_uid),
        );
        self.rewrite_uid(&mut dataset, tags::FRAME_OF_REFERENCE_UID);

        map_items(
            &mut dataset,
            tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
            |frame| Ok(self.frame_reference(frame)),
        )?;
        map_items(&mut dataset, tags::STRUCTURE_SET_ROI_SEQUENCE, |roi| {
            let mut roi = roi.clone();
            self.rewrite_uid(&mut roi, tags::REFERENCED_FRAME_OF_REFERENCE_UID);
            Ok(roi)
        })?;
        map_items(&mut dataset, tags::ROI_CONTOUR_SEQUENCE, |roi_contour| {
            let mut roi_contour = roi_contour.clone();
            map_items(&mut roi_contour, tags::CONTOUR_SEQUENCE, |contour| {
                let mut contour = contour.clone();
                self.rewrite_image_references(&mut contour);
                Ok(contour)
            })?;
            Ok(roi_contour)
        })?;
        map_items(
            &mut dataset,
            tags::RTROI_OBSERVATIONS_SEQUENCE,
            |observation| {
                let roi = referenced_roi_number(observation)?;
                Ok(if consumed.contains(&roi) {
                    tracing::debug!(roi, "marking consumed bolus ROI as control");
                    retire(observation)
                } else {
                    observation.clone()
                })
            },
        )?;

        let media_uid = self
            .rewriter
            .rewrite(source.meta().media_storage_sop_instance_uid());
        rebuild_meta(dataset, source.meta(), &media_uid, source.meta().transfer_syntax())
    }

    /// Transform `source` and write the result to `path`.
    pub fn write(
        &self,
        source: &FileDicomObject<InMemDicomObject>,
        consumed: &[i32],
        path: &Path,
    ) -> Result<String, TransformError> {
        let object = self.transform(source, consumed)?;
        object
            .write_to_file(path)
            .map_err(|source| TransformError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!(path = %path.display(), consumed = ?consumed, "wrote structure set");
        Ok(object.meta().media_storage_sop_instance_uid().to_owned())
    }

    fn rewrite_uid(&self, obj: &mut InMemDicomObject, tag: Tag) {
        if let Some(uid) = attributes::opt_string(obj, tag) {
            attributes::put_uid(obj, tag, &self.rewriter.rewrite(&uid));
        }
    }

    fn rewrite_image_references(&self, obj: &mut InMemDicomObject) {
        if obj.get(tags::CONTOUR_IMAGE_SEQUENCE).is_some() {
            let images = rewrite_references(
                attributes::items(obj, tags::CONTOUR_IMAGE_SEQUENCE),
                &self.rewriter,
            );
            attributes::put_sequence(obj, tags::CONTOUR_IMAGE_SEQUENCE, images);
        }
    }

    // Frame of reference -> study -> series -> contour images
    fn frame_reference(&self, frame: &InMemDicomObject) -> InMemDicomObject {
        let mut frame = frame.clone();
        self.rewrite_uid(&mut frame, tags::FRAME_OF_REFERENCE_UID);
        let studies: Vec<_> = attributes::items(&frame, tags::RT_REFERENCED_STUDY_SEQUENCE)
            .iter()
            .map(|study| self.study_reference(study))
            .collect();
        if !studies.is_empty() {
            attributes::put_sequence(&mut frame, tags::RT_REFERENCED_STUDY_SEQUENCE, studies);
        }
        frame
    }

    fn study_reference(&self, study: &InMemDicomObject) -> InMemDicomObject {
        let mut study = study.clone();
        let series: Vec<_> = attributes::items(&study, tags::RT_REFERENCED_SERIES_SEQUENCE)
            .iter()
            .map(|series| {
                let mut series = series.clone();
                self.rewrite_uid(&mut series, tags::SERIES_INSTANCE_UID);
                self.rewrite_image_references(&mut series);
                series
            })
            .collect();
        if !series.is_empty() {
            attributes::put_sequence(&mut study, tags::RT_REFERENCED_SERIES_SEQUENCE, series);
        }
        study
    }
}

/// Observation item of an ROI that no longer describes an active bolus.
fn retire(observation: &InMemDicomObject) -> InMemDicomObject {
    let mut observation = observation.clone();
    attributes::put_str(
        &mut observation,
        tags::RTROI_INTERPRETED_TYPE,
        VR::CS,
        InterpretedType::Control.code(),
    );
    observation.remove_element(tags::ROI_PHYSICAL_PROPERTIES_SEQUENCE);
    observation
}

/// Replace the items of sequence `tag` with `f` applied to each, if present.
fn map_items<F>(obj: &mut InMemDicomObject, tag: Tag, f: F) -> Result<(), TransformError>
where
    F: Fn(&InMemDicomObject) -> Result<InMemDicomObject, TransformError>,
{
    if obj.get(tag).is_none() {
        return Ok(());
    }
    let items = attributes::items(obj, tag)
        .iter()
        .map(f)
        .collect::<Result<Vec<_>, _>>()?;
    attributes::put_sequence(obj, tag, items);
    Ok(())
}
