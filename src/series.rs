use crate::attributes::{self, AttributeError};
use crate::enums::SortBy;

use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption};
use dicom_dictionary_std::tags;
use ndarray::{Array2, s};
use std::collections::HashMap;
use thiserror::Error;

const ORIENTATION_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("No valid CT images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Inconsistent image orientation")]
    InconsistentOrientation,

    #[error("Rescale slope/intercept differ between slices")]
    NonUniformRescale,

    #[error("Unsupported pixel data in {uid}: {reason}")]
    UnsupportedPixelData { uid: String, reason: String },

    #[error("Failed to decode pixel data of {uid}: {source}")]
    PixelDecode {
        uid: String,
        #[source]
        source: dicom::pixeldata::Error,
    },

    #[error("No RTSTRUCT file found")]
    NoStructureSet,

    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// Affine map between stored pixel values and Hounsfield units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rescale {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for Rescale {
    fn default() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
        }
    }
}

impl Rescale {
    #[inline]
    pub fn to_hu(&self, raw: f64) -> f64 {
        raw * self.slope + self.intercept
    }

    #[inline]
    pub fn to_raw(&self, hu: f64) -> f64 {
        (hu - self.intercept) / self.slope
    }
}

/// One CT image together with the dataset it was read from.
#[derive(Clone, Debug)]
pub struct CtSlice {
    pub object: FileDicomObject<InMemDicomObject>,
    pub sop_instance_uid: String,
    pub instance_number: i32,
    pub position: [f64; 3],
    pub orientation: [f64; 6],
    /// Distance between voxel centres along (x, y) in mm
    pub pixel_spacing: (f64, f64),
    pub slice_thickness: Option<f64>,
    pub rescale: Rescale,
    pub pixels: Array2<u16>,
}

impl CtSlice {
    pub fn from_object(object: FileDicomObject<InMemDicomObject>) -> Result<Self, SeriesError> {
        let sop_instance_uid =
            attributes::string(&object, tags::SOP_INSTANCE_UID, "SOPInstanceUID")?;
        let instance_number = attributes::int(&object, tags::INSTANCE_NUMBER, "InstanceNumber")?;
        let position = triple(attributes::floats(
            &object,
            tags::IMAGE_POSITION_PATIENT,
            "ImagePositionPatient",
        )?)
        .ok_or(AttributeError::Missing("ImagePositionPatient"))?;
        let orientation: [f64; 6] = attributes::floats(
            &object,
            tags::IMAGE_ORIENTATION_PATIENT,
            "ImageOrientationPatient",
        )?
        .try_into()
        .map_err(|_| AttributeError::Missing("ImageOrientationPatient"))?;

        // PixelSpacing is (row spacing, column spacing), i.e. (y, x)
        let spacing = attributes::floats(&object, tags::PIXEL_SPACING, "PixelSpacing")?;
        let [spacing_y, spacing_x] = spacing[..] else {
            return Err(AttributeError::Missing("PixelSpacing").into());
        };
        let slice_thickness =
            attributes::float(&object, tags::SLICE_THICKNESS, "SliceThickness").ok();

        let rescale = Rescale {
            slope: attributes::float(&object, tags::RESCALE_SLOPE, "RescaleSlope").unwrap_or(1.0),
            intercept: attributes::float(&object, tags::RESCALE_INTERCEPT, "RescaleIntercept")
                .unwrap_or(0.0),
        };

        let pixels = decode_pixels(&object, &sop_instance_uid)?;

        Ok(Self {
            object,
            sop_instance_uid,
            instance_number,
            position,
            orientation,
            pixel_spacing: (spacing_x, spacing_y),
            slice_thickness,
            rescale,
            pixels,
        })
    }

    /// Unit normal of the image plane (row cosine x column cosine)
    pub fn normal(&self) -> [f64; 3] {
        let r = &self.orientation[..3];
        let c = &self.orientation[3..];
        [
            r[1] * c[2] - r[2] * c[1],
            r[2] * c[0] - r[0] * c[2],
            r[0] * c[1] - r[1] * c[0],
        ]
    }

    fn distance_along(&self, normal: &[f64; 3]) -> f64 {
        self.position
            .iter()
            .zip(normal)
            .map(|(p, n)| p * n)
            .sum()
    }
}

fn triple(values: Vec<f64>) -> Option<[f64; 3]> {
    values.try_into().ok()
}

/// Stored sample values of the first frame, without any modality or VOI LUT.
fn decode_pixels(
    object: &FileDicomObject<InMemDicomObject>,
    uid: &str,
) -> Result<Array2<u16>, SeriesError> {
    let unsupported = |reason: &str| SeriesError::UnsupportedPixelData {
        uid: uid.to_owned(),
        reason: reason.to_owned(),
    };

    // Burned slices are written back as 16 bit unsigned samples
    let bits_allocated = attributes::int(object, tags::BITS_ALLOCATED, "BitsAllocated")?;
    let representation =
        attributes::int(object, tags::PIXEL_REPRESENTATION, "PixelRepresentation").unwrap_or(0);
    if bits_allocated != 16 {
        return Err(unsupported("only 16 bit samples are supported"));
    }
    if representation != 0 {
        return Err(unsupported("only unsigned samples are supported"));
    }

    let decode_error = |source| SeriesError::PixelDecode {
        uid: uid.to_owned(),
        source,
    };
    let options = ConvertOptions::new()
        .with_modality_lut(ModalityLutOption::None)
        .with_voi_lut(VoiLutOption::Identity);
    let pixels = object
        .decode_pixel_data()
        .map_err(decode_error)?
        .to_ndarray_with_options::<u16>(&options)
        .map_err(decode_error)?;
    Ok(pixels.slice_move(s![0, .., .., 0]))
}

/// CT slices of one series, ordered along the volume normal.
#[derive(Clone, Debug)]
pub struct Series {
    slices: Vec<CtSlice>,
}

impl Series {
    pub fn new(mut slices: Vec<CtSlice>, sort_by: SortBy) -> Result<Self, SeriesError> {
        if slices.is_empty() {
            return Err(SeriesError::NoValidImages);
        }
        Self::validate_geometry(&slices)?;
        Self::sort_slices(&mut slices, sort_by);
        Ok(Self { slices })
    }

    fn validate_geometry(slices: &[CtSlice]) -> Result<(), SeriesError> {
        let first = &slices[0];
        if slices.iter().any(|s| s.pixels.dim() != first.pixels.dim()) {
            return Err(SeriesError::InconsistentDimensions);
        }
        let same_orientation = |s: &CtSlice| {
            s.orientation
                .iter()
                .zip(&first.orientation)
                .all(|(a, b)| (a - b).abs() < ORIENTATION_TOLERANCE)
        };
        if !slices.iter().all(same_orientation) {
            return Err(SeriesError::InconsistentOrientation);
        }
        Ok(())
    }

    fn sort_slices(slices: &mut [CtSlice], sort_by: SortBy) {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let normal = slices[0].normal();
                slices.sort_by(|a, b| {
                    a.distance_along(&normal)
                        .total_cmp(&b.distance_along(&normal))
                });
            }
            SortBy::InstanceNumber => slices.sort_by_key(|s| s.instance_number),
        }
    }

    pub fn slices(&self) -> &[CtSlice] {
        &self.slices
    }

    pub fn into_slices(self) -> Vec<CtSlice> {
        self.slices
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Get the dimensions of the series (depth, rows, columns)
    pub fn dim(&self) -> (usize, usize, usize) {
        let (rows, columns) = self.slices[0].pixels.dim();
        (self.slices.len(), rows, columns)
    }

    /// Position of the first voxel of the first slice
    pub fn origin(&self) -> [f64; 3] {
        self.slices[0].position
    }

    pub fn pixel_spacing(&self) -> (f64, f64) {
        self.slices[0].pixel_spacing
    }

    pub fn uid_to_index(&self) -> HashMap<String, usize> {
        self.slices
            .iter()
            .enumerate()
            .map(|(i, s)| (s.sop_instance_uid.clone(), i))
            .collect()
    }

    /// The rescale shared by every slice of the series.
    pub fn uniform_rescale(&self) -> Result<Rescale, SeriesError> {
        let first = self.slices[0].rescale;
        if self.slices.iter().any(|s| s.rescale != first) {
            return Err(SeriesError::NonUniformRescale);
        }
        Ok(first)
    }
}
