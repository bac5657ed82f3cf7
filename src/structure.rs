use crate::attributes::{self, AttributeError};
use crate::coords::{CoordinateError, mm_to_voxel};
use crate::enums::InterpretedType;

use dicom::object::InMemDicomObject;
use dicom_dictionary_std::tags;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("ROI {roi} references slice {uid}, which is not part of the series")]
    UnknownSlice { roi: i32, uid: String },

    #[error("A contour of ROI {roi} has no image reference")]
    MissingImageReference { roi: i32 },

    #[error("Invalid contour data in ROI {roi}: {source}")]
    ContourData {
        roi: i32,
        #[source]
        source: CoordinateError,
    },

    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

/// A named ROI and its voxel-space contours per slice index.
#[derive(Clone, Debug, Serialize)]
pub struct Structure {
    pub name: String,
    pub number: i32,
    pub color: Vec<i32>,
    pub interpreted_type: InterpretedType,
    pub contours: BTreeMap<usize, Vec<Vec<[f64; 2]>>>,
}

/// An ROI that can be burned into the CT.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BolusRoi {
    pub name: String,
    pub number: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct StructureSet {
    pub structures: Vec<Structure>,
    pub bolus: Vec<BolusRoi>,
}

/// One planar contour as stored in the structure set.
#[derive(Clone, Debug)]
pub struct Contour {
    pub image_uid: String,
    /// Flat (x, y, z) triplets in mm
    pub points_mm: Vec<f64>,
}

impl Contour {
    fn from_item(item: &InMemDicomObject, roi: i32) -> Result<Self, StructureError> {
        let image_uid = attributes::items(item, tags::CONTOUR_IMAGE_SEQUENCE)
            .first()
            .and_then(|image| attributes::opt_string(image, tags::REFERENCED_SOP_INSTANCE_UID))
            .ok_or(StructureError::MissingImageReference { roi })?;
        let points_mm = attributes::floats(item, tags::CONTOUR_DATA, "ContourData")?;
        if points_mm.len() % 3 != 0 {
            return Err(StructureError::ContourData {
                roi,
                source: CoordinateError::NotTriplets(points_mm.len()),
            });
        }
        Ok(Self {
            image_uid,
            points_mm,
        })
    }
}

/// All contours of the ROI `roi_number`, empty if it has no contour sequence.
pub fn roi_contours(
    rtstruct: &InMemDicomObject,
    roi_number: i32,
) -> Result<Vec<Contour>, StructureError> {
    let mut contours = Vec::new();
    for roi_contour in attributes::items(rtstruct, tags::ROI_CONTOUR_SEQUENCE) {
        if referenced_roi_number(roi_contour)? != roi_number {
            continue;
        }
        for item in attributes::items(roi_contour, tags::CONTOUR_SEQUENCE) {
            contours.push(Contour::from_item(item, roi_number)?);
        }
    }
    Ok(contours)
}

pub(crate) fn referenced_roi_number(item: &InMemDicomObject) -> Result<i32, AttributeError> {
    attributes::int(item, tags::REFERENCED_ROI_NUMBER, "ReferencedROINumber")
}

/// Pair every ROI of a structure set with its display colour, type and
/// contours mapped into the voxel grid of the series.
///
/// `uid_to_index` maps each CT SOP Instance UID to its position in the
/// sorted series. A contour on a slice outside that mapping means the
/// structure set does not belong to the series and fails the parse.
pub fn parse_structures(
    rtstruct: &InMemDicomObject,
    uid_to_index: &HashMap<String, usize>,
    origin: [f64; 3],
    spacing: (f64, f64),
) -> Result<StructureSet, StructureError> {
    let colors: HashMap<i32, Vec<i32>> = attributes::items(rtstruct, tags::ROI_CONTOUR_SEQUENCE)
        .iter()
        .map(|item| -> Result<(i32, Vec<i32>), AttributeError> {
            let color = item
                .get(tags::ROI_DISPLAY_COLOR)
                .and_then(|e| e.to_multi_int::<i32>().ok())
                .unwrap_or_default();
            Ok((referenced_roi_number(item)?, color))
        })
        .collect::<Result<_, AttributeError>>()?;

    let types: HashMap<i32, InterpretedType> =
        attributes::items(rtstruct, tags::RTROI_OBSERVATIONS_SEQUENCE)
            .iter()
            .map(|item| -> Result<(i32, InterpretedType), AttributeError> {
                let code = attributes::opt_string(item, tags::RTROI_INTERPRETED_TYPE)
                    .unwrap_or_default();
                Ok((referenced_roi_number(item)?, InterpretedType::from_code(&code)))
            })
            .collect::<Result<_, AttributeError>>()?;

    let mut structures = Vec::new();
    let mut bolus = Vec::new();

    for roi in attributes::items(rtstruct, tags::STRUCTURE_SET_ROI_SEQUENCE) {
        let number = attributes::int(roi, tags::ROI_NUMBER, "ROINumber")?;
        let name = attributes::opt_string(roi, tags::ROI_NAME).unwrap_or_default();
        let interpreted_type = types
            .get(&number)
            .cloned()
            .unwrap_or_else(|| InterpretedType::Other(String::new()));

        if interpreted_type == InterpretedType::Bolus {
            bolus.push(BolusRoi {
                name: name.clone(),
                number,
            });
        }

        let mut contours: BTreeMap<usize, Vec<Vec<[f64; 2]>>> = BTreeMap::new();
        for contour in roi_contours(rtstruct, number)? {
            let index = *uid_to_index
                .get(&contour.image_uid)
                .ok_or_else(|| StructureError::UnknownSlice {
                    roi: number,
                    uid: contour.image_uid.clone(),
                })?;
            let voxels = mm_to_voxel(&contour.points_mm, origin, spacing)
                .map_err(|source| StructureError::ContourData { roi: number, source })?;
            contours.entry(index).or_default().push(voxels);
        }

        structures.push(Structure {
            name,
            number,
            color: colors.get(&number).cloned().unwrap_or_default(),
            interpreted_type,
            contours,
        });
    }

    structures.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(
        structures = structures.len(),
        bolus = bolus.len(),
        "parsed structure set"
    );

    Ok(StructureSet { structures, bolus })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn uid_to_index(uids: &[&str]) -> HashMap<String, usize> {
        uids.iter()
            .enumerate()
            .map(|(i, uid)| (uid.to_string(), i))
            .collect()
    }

    #[test]
    fn parses_structures_sorted_by_name() {
        let rtstruct = rtstruct_object(
            &["1.2.3.1", "1.2.3.2"],
            &[
                RoiSpec {
                    number: 1,
                    name: "Skin",
                    interpreted_type: "EXTERNAL",
                    contours: vec![("1.2.3.1", rectangle(0.0, 0.0, 4.0, 4.0, 0.0))],
                },
                RoiSpec {
                    number: 2,
                    name: "Bolus 5mm",
                    interpreted_type: "BOLUS",
                    contours: vec![
                        ("1.2.3.2", rectangle(1.0, 1.0, 2.0, 2.0, 2.5)),
                        ("1.2.3.2", rectangle(3.0, 3.0, 4.0, 4.0, 2.5)),
                    ],
                },
            ],
        );

        let parsed = parse_structures(
            &rtstruct,
            &uid_to_index(&["1.2.3.1", "1.2.3.2"]),
            [-1.0, -2.0, 0.0],
            (0.5, 1.0),
        )
        .unwrap();

        let names: Vec<_> = parsed.structures.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Bolus 5mm", "Skin"]);
        assert_eq!(
            parsed.bolus,
            vec![BolusRoi {
                name: "Bolus 5mm".into(),
                number: 2
            }]
        );

        let bolus = &parsed.structures[0];
        assert_eq!(bolus.color, vec![255, 0, 128]);
        assert_eq!(bolus.interpreted_type, InterpretedType::Bolus);
        assert_eq!(bolus.contours.len(), 1);
        assert_eq!(bolus.contours[&1].len(), 2);
        assert_eq!(bolus.contours[&1][0][0], [4.0, 3.0]);

        assert_eq!(parsed.structures[1].contours[&0].len(), 1);
    }

    #[test]
    fn unknown_slice_is_fatal() {
        let rtstruct = rtstruct_object(
            &["1.2.3.1"],
            &[RoiSpec {
                number: 7,
                name: "Bolus",
                interpreted_type: "BOLUS",
                contours: vec![("9.9.9", rectangle(0.0, 0.0, 1.0, 1.0, 0.0))],
            }],
        );
        let err = parse_structures(&rtstruct, &uid_to_index(&["1.2.3.1"]), [0.0; 3], (1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, StructureError::UnknownSlice { roi: 7, ref uid } if uid == "9.9.9"));
    }

    #[test]
    fn malformed_contour_data_is_fatal() {
        let rtstruct = rtstruct_object(
            &["1.2.3.1"],
            &[RoiSpec {
                number: 1,
                name: "Bolus",
                interpreted_type: "BOLUS",
                contours: vec![("1.2.3.1", vec![0.0, 0.0, 0.0, 1.0])],
            }],
        );
        assert!(matches!(
            roi_contours(&rtstruct, 1),
            Err(StructureError::ContourData { roi: 1, .. })
        ));
    }

    #[test]
    fn roi_without_contours_is_empty() {
        let rtstruct = rtstruct_object(&["1.2.3.1"], &[]);
        assert!(roi_contours(&rtstruct, 3).unwrap().is_empty());
    }
}
