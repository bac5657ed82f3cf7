//! # Synthetic bolus library
//!
//! This crate burns radiotherapy bolus structures into a CT series.
//!
//! This library is built on the dicom-rs ecosystem. A CT series and the
//! structure set (RTSTRUCT) delineating it are read from a directory; the
//! contours of the selected ROIs are rasterized into per-slice masks which
//! are then written into the pixel data of a derived CT series. The derived
//! series and a derived structure set are written with rewritten
//! identifiers, so that they reference each other but not the original
//! objects. Study and frame of reference of the CT series are preserved, so
//! the derived series stays registered with the original one.
//! If the environment supports it, slices are loaded, contours rasterized
//! and slices written in parallel using rayon.
//!
//! DICOM files are assumed to have the following attributes:
//!   - Uncompressed 16 bit unsigned pixel data
//!   - No multiframe
//!   - One CT series and one structure set per directory
//!   - The same rescale slope and intercept on every slice
//!
//! A derived series can be checked against its original with
//! [`pipeline::validate`], which compares pixel data by digest.
//!
//! # Examples
//!
//! ## Burning a bolus into a series
//!
//! List the bolus ROIs of the structure set in `dicom/`, burn the first one
//! into the series and write the result to `synthetic/`.
//!
//! ```no_run
//! # use synthetic_bolus::config::{BolusConfig, RunPaths};
//! # use synthetic_bolus::pipeline;
//! # use std::path::Path;
//! let structures = pipeline::list_structures(Path::new("dicom"))
//!     .expect("should have read the structure set");
//! let roi = structures.bolus[0].number;
//!
//! let paths = RunPaths::new("dicom", "synthetic");
//! let report = pipeline::generate(&paths, &BolusConfig::default(), &[roi])
//!     .expect("should have written the synthetic series");
//! println!("{} of {} slices masked", report.mask_uids.len(), report.slices);
//! ```

pub mod attributes;
pub mod config;
pub mod coords;
pub mod enums;
pub mod integrity;
pub mod mask;
pub mod pipeline;
pub mod raster;
pub mod rtstruct_transformer;
pub mod series;
pub mod series_loader;
pub mod series_transformer;
pub mod structure;
pub mod uid;

#[cfg(test)]
mod test_support;
