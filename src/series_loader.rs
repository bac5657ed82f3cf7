use crate::attributes;
use crate::enums::{Modality, SortBy};
use crate::series::{CtSlice, Series, SeriesError};

use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom_dictionary_std::tags;
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub struct SeriesLoader;

impl SeriesLoader {
    /// Build a series from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - DICOM file objects; anything that is not CT is skipped
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no CT images are found, a CT image cannot be read,
    /// or the slices do not share dimensions and orientation
    pub fn load_from_dicom_objects(
        dicom_objects: Vec<FileDicomObject<InMemDicomObject>>,
        sort_by: SortBy,
    ) -> Result<Series, SeriesError> {
        let slices: Vec<CtSlice> = dicom_objects
            .into_par_iter()
            .filter(|object| Self::modality(object) == Modality::Ct)
            .map(CtSlice::from_object)
            .collect::<Result<_, _>>()?;

        let series = Series::new(slices, sort_by)?;
        let (depth, rows, columns) = series.dim();
        tracing::debug!(depth, rows, columns, "loaded CT series");
        Ok(series)
    }

    /// Load a series from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        sort_by: SortBy,
    ) -> Result<Series, SeriesError> {
        let objects: Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| open_file(path.as_ref()))
            .collect();

        Self::load_from_dicom_objects(objects?, sort_by)
    }

    /// Load a series from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Series, SeriesError> {
        let paths = Self::dcm_paths(path.as_ref())?;

        if paths.is_empty() {
            return Err(SeriesError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    /// Locate the structure set among the .dcm files of a directory
    pub fn find_rtstruct(path: impl AsRef<Path>) -> Result<PathBuf, SeriesError> {
        let mut paths = Self::dcm_paths(path.as_ref())?;
        paths.sort();

        for path in paths {
            let object = open_file(&path)?;
            if Self::modality(&object) == Modality::RtStruct {
                return Ok(path);
            }
        }

        Err(SeriesError::NoStructureSet)
    }

    /// Locate and read the structure set of a directory
    pub fn load_rtstruct(
        path: impl AsRef<Path>,
    ) -> Result<(PathBuf, FileDicomObject<InMemDicomObject>), SeriesError> {
        let path = Self::find_rtstruct(path)?;
        let object = open_file(&path)?;
        Ok((path, object))
    }

    fn dcm_paths(path: &Path) -> Result<Vec<PathBuf>, SeriesError> {
        Ok(fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect())
    }

    fn modality(dicom_object: &FileDicomObject<InMemDicomObject>) -> Modality {
        attributes::opt_string(dicom_object, tags::MODALITY)
            .map(|code| Modality::from_code(&code))
            .unwrap_or(Modality::Other)
    }
}
