//! In-memory CT and RTSTRUCT datasets for unit tests.

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::mem::InMemElement;
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::tags;

pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
pub const RT_STRUCTURE_SET_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.481.3";
pub const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

pub const STUDY_UID: &str = "1.2.3.100";
pub const CT_SERIES_UID: &str = "1.2.3.200";
pub const FRAME_OF_REFERENCE_UID: &str = "1.2.3.300";
pub const IRRADIATION_EVENT_UID: &str = "1.2.3.400";
pub const RS_SERIES_UID: &str = "1.2.3.500";
pub const RS_INSTANCE_UID: &str = "1.2.3.900";

pub struct CtSpec<'a> {
    pub uid: &'a str,
    pub instance_number: i32,
    pub z: f64,
    pub rows: u16,
    pub columns: u16,
    pub intercept: f64,
    pub pixels: Vec<u16>,
}

pub struct RoiSpec<'a> {
    pub number: i32,
    pub name: &'a str,
    pub interpreted_type: &'a str,
    /// (referenced CT UID, flat x/y/z millimetre points)
    pub contours: Vec<(&'a str, Vec<f64>)>,
}

pub fn ds(values: &[f64]) -> PrimitiveValue {
    PrimitiveValue::Strs(
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .into(),
    )
}

pub fn element(tag: Tag, vr: VR, value: impl Into<PrimitiveValue>) -> InMemElement {
    DataElement::new(tag, vr, value.into())
}

pub fn sequence(tag: Tag, items: Vec<InMemDicomObject>) -> InMemElement {
    DataElement::new(tag, VR::SQ, DataSetSequence::from(items))
}

pub fn file_object(
    dataset: InMemDicomObject,
    sop_class_uid: &str,
    sop_instance_uid: &str,
) -> FileDicomObject<InMemDicomObject> {
    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LE)
        .media_storage_sop_class_uid(sop_class_uid)
        .media_storage_sop_instance_uid(sop_instance_uid)
        .build()
        .unwrap();
    dataset.with_exact_meta(meta)
}

pub fn ct_object(spec: &CtSpec<'_>) -> FileDicomObject<InMemDicomObject> {
    let referenced_image = InMemDicomObject::from_element_iter([
        element(tags::REFERENCED_SOP_CLASS_UID, VR::UI, CT_IMAGE_STORAGE),
        element(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, "1.2.3.700.1"),
    ]);
    let dataset = InMemDicomObject::from_element_iter([
        element(tags::SOP_CLASS_UID, VR::UI, CT_IMAGE_STORAGE),
        element(tags::SOP_INSTANCE_UID, VR::UI, spec.uid),
        element(tags::MODALITY, VR::CS, "CT"),
        element(tags::STUDY_INSTANCE_UID, VR::UI, STUDY_UID),
        element(tags::SERIES_INSTANCE_UID, VR::UI, CT_SERIES_UID),
        element(tags::FRAME_OF_REFERENCE_UID, VR::UI, FRAME_OF_REFERENCE_UID),
        element(tags::IRRADIATION_EVENT_UID, VR::UI, IRRADIATION_EVENT_UID),
        sequence(tags::REFERENCED_IMAGE_SEQUENCE, vec![referenced_image]),
        element(
            tags::INSTANCE_NUMBER,
            VR::IS,
            spec.instance_number.to_string(),
        ),
        element(tags::IMAGE_POSITION_PATIENT, VR::DS, ds(&[0.0, 0.0, spec.z])),
        element(
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            ds(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
        ),
        element(tags::PIXEL_SPACING, VR::DS, ds(&[1.0, 1.0])),
        element(tags::SLICE_THICKNESS, VR::DS, ds(&[2.5])),
        element(tags::ROWS, VR::US, spec.rows),
        element(tags::COLUMNS, VR::US, spec.columns),
        element(tags::BITS_ALLOCATED, VR::US, 16_u16),
        element(tags::BITS_STORED, VR::US, 16_u16),
        element(tags::HIGH_BIT, VR::US, 15_u16),
        element(tags::PIXEL_REPRESENTATION, VR::US, 0_u16),
        element(tags::SAMPLES_PER_PIXEL, VR::US, 1_u16),
        element(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2"),
        element(tags::RESCALE_SLOPE, VR::DS, ds(&[1.0])),
        element(tags::RESCALE_INTERCEPT, VR::DS, ds(&[spec.intercept])),
        element(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(spec.pixels.clone().into()),
        ),
    ]);
    file_object(dataset, CT_IMAGE_STORAGE, spec.uid)
}

fn contour_image(uid: &str) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        element(tags::REFERENCED_SOP_CLASS_UID, VR::UI, CT_IMAGE_STORAGE),
        element(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, uid),
    ])
}

/// A structure set whose frame of reference lists `ct_uids` and which
/// defines `rois`.
pub fn rtstruct_object(
    ct_uids: &[&str],
    rois: &[RoiSpec<'_>],
) -> FileDicomObject<InMemDicomObject> {
    let series = InMemDicomObject::from_element_iter([
        element(tags::SERIES_INSTANCE_UID, VR::UI, CT_SERIES_UID),
        sequence(
            tags::CONTOUR_IMAGE_SEQUENCE,
            ct_uids.iter().map(|uid| contour_image(uid)).collect(),
        ),
    ]);
    let study = InMemDicomObject::from_element_iter([
        element(tags::REFERENCED_SOP_CLASS_UID, VR::UI, "1.2.840.10008.3.1.2.3.1"),
        element(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, STUDY_UID),
        sequence(tags::RT_REFERENCED_SERIES_SEQUENCE, vec![series]),
    ]);
    let frame = InMemDicomObject::from_element_iter([
        element(tags::FRAME_OF_REFERENCE_UID, VR::UI, FRAME_OF_REFERENCE_UID),
        sequence(tags::RT_REFERENCED_STUDY_SEQUENCE, vec![study]),
    ]);

    let roi_items = rois
        .iter()
        .map(|roi| {
            InMemDicomObject::from_element_iter([
                element(tags::ROI_NUMBER, VR::IS, roi.number.to_string()),
                element(
                    tags::REFERENCED_FRAME_OF_REFERENCE_UID,
                    VR::UI,
                    FRAME_OF_REFERENCE_UID,
                ),
                element(tags::ROI_NAME, VR::LO, roi.name),
            ])
        })
        .collect();

    let contour_items = rois
        .iter()
        .map(|roi| {
            let contours = roi
                .contours
                .iter()
                .map(|(uid, points)| {
                    InMemDicomObject::from_element_iter([
                        sequence(tags::CONTOUR_IMAGE_SEQUENCE, vec![contour_image(uid)]),
                        element(tags::CONTOUR_GEOMETRIC_TYPE, VR::CS, "CLOSED_PLANAR"),
                        element(
                            tags::NUMBER_OF_CONTOUR_POINTS,
                            VR::IS,
                            (points.len() / 3).to_string(),
                        ),
                        element(tags::CONTOUR_DATA, VR::DS, ds(points)),
                    ])
                })
                .collect();
            InMemDicomObject::from_element_iter([
                element(
                    tags::ROI_DISPLAY_COLOR,
                    VR::IS,
                    PrimitiveValue::Strs(
                        vec!["255".to_owned(), "0".to_owned(), "128".to_owned()].into(),
                    ),
                ),
                sequence(tags::CONTOUR_SEQUENCE, contours),
                element(tags::REFERENCED_ROI_NUMBER, VR::IS, roi.number.to_string()),
            ])
        })
        .collect();

    let observation_items = rois
        .iter()
        .map(|roi| {
            let properties = InMemDicomObject::from_element_iter([
                element(tags::ROI_PHYSICAL_PROPERTY, VR::CS, "REL_ELEC_DENSITY"),
                element(tags::ROI_PHYSICAL_PROPERTY_VALUE, VR::DS, ds(&[1.0])),
            ]);
            InMemDicomObject::from_element_iter([
                element(tags::OBSERVATION_NUMBER, VR::IS, roi.number.to_string()),
                element(tags::REFERENCED_ROI_NUMBER, VR::IS, roi.number.to_string()),
                element(tags::RTROI_INTERPRETED_TYPE, VR::CS, roi.interpreted_type),
                sequence(tags::ROI_PHYSICAL_PROPERTIES_SEQUENCE, vec![properties]),
            ])
        })
        .collect();

    let dataset = InMemDicomObject::from_element_iter([
        element(tags::SOP_CLASS_UID, VR::UI, RT_STRUCTURE_SET_STORAGE),
        element(tags::SOP_INSTANCE_UID, VR::UI, RS_INSTANCE_UID),
        element(tags::MODALITY, VR::CS, "RTSTRUCT"),
        element(tags::STUDY_INSTANCE_UID, VR::UI, STUDY_UID),
        element(tags::SERIES_INSTANCE_UID, VR::UI, RS_SERIES_UID),
        element(tags::FRAME_OF_REFERENCE_UID, VR::UI, FRAME_OF_REFERENCE_UID),
        sequence(tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE, vec![frame]),
        sequence(tags::STRUCTURE_SET_ROI_SEQUENCE, roi_items),
        sequence(tags::ROI_CONTOUR_SEQUENCE, contour_items),
        sequence(tags::RTROI_OBSERVATIONS_SEQUENCE, observation_items),
    ]);
    file_object(dataset, RT_STRUCTURE_SET_STORAGE, RS_INSTANCE_UID)
}

/// Closed axis-aligned rectangle at height `z`, in millimetres
pub fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64, z: f64) -> Vec<f64> {
    vec![x0, y0, z, x1, y0, z, x1, y1, z, x0, y1, z]
}
