//! Content-based verification of a derived series.
//!
//! Slices are paired by instance number, since the derived series carries
//! rewritten identifiers, and their pixel buffers are compared by digest.

use crate::series::{CtSlice, Series};

use blake2::Blake2bVar;
use blake2::digest::{Update, VariableOutput};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

pub const DIGEST_SIZE: usize = 30;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Failed to compute pixel digest")]
    Digest,
}

/// SOP Instance UIDs of the derived series, split by pixel equality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub changed: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

/// BLAKE2b digest of the stored pixel values of a slice.
pub fn pixel_digest(slice: &CtSlice) -> Result<[u8; DIGEST_SIZE], IntegrityError> {
    let pixels = slice.pixels.as_standard_layout();
    let samples = pixels.as_slice().ok_or(IntegrityError::Digest)?;

    let mut hasher = Blake2bVar::new(DIGEST_SIZE).map_err(|_| IntegrityError::Digest)?;
    hasher.update(bytemuck::cast_slice::<u16, u8>(samples));
    let mut digest = [0; DIGEST_SIZE];
    hasher
        .finalize_variable(&mut digest)
        .map_err(|_| IntegrityError::Digest)?;
    Ok(digest)
}

/// Classify every slice of `modified` as changed or unchanged relative to
/// the slice of `original` with the same instance number.
///
/// A modified slice without a counterpart counts as changed.
pub fn compare(original: &Series, modified: &Series) -> Result<IntegrityReport, IntegrityError> {
    let originals: HashMap<i32, &CtSlice> = original
        .slices()
        .iter()
        .map(|s| (s.instance_number, s))
        .collect();

    let mut report = IntegrityReport::default();
    for slice in modified.slices() {
        let unchanged = match originals.get(&slice.instance_number) {
            Some(source) => pixel_digest(source)? == pixel_digest(slice)?,
            None => {
                tracing::warn!(
                    instance_number = slice.instance_number,
                    uid = %slice.sop_instance_uid,
                    "no original slice with this instance number"
                );
                false
            }
        };

        let uid = slice.sop_instance_uid.clone();
        if unchanged {
            report.unchanged.insert(uid);
        } else {
            report.changed.insert(uid);
        }
    }

    tracing::debug!(
        changed = report.changed.len(),
        unchanged = report.unchanged.len(),
        "compared pixel digests"
    );
    Ok(report)
}

/// Collapse runs of consecutive values: `[1, 2, 3, 5]` becomes `"1-3, 5"`.
///
/// The input is expected in ascending order.
pub fn summarize(values: &[usize]) -> String {
    let mut ranges: Vec<String> = Vec::new();
    let mut iter = values.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        ranges.push(if start == end {
            start.to_string()
        } else {
            format!("{start}-{end}")
        });
    }

    ranges.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::SortBy;
    use crate::test_support::*;

    fn slice(uid: &str, instance_number: i32, pixels: Vec<u16>) -> CtSlice {
        CtSlice::from_object(ct_object(&CtSpec {
            uid,
            instance_number,
            z: instance_number as f64,
            rows: 2,
            columns: 2,
            intercept: -1024.0,
            pixels,
        }))
        .unwrap()
    }

    fn series(slices: Vec<CtSlice>) -> Series {
        Series::new(slices, SortBy::InstanceNumber).unwrap()
    }

    #[test]
    fn summarizes_runs() {
        assert_eq!(summarize(&[1, 2, 3, 5, 7, 8, 9]), "1-3, 5, 7-9");
        assert_eq!(summarize(&[]), "");
        assert_eq!(summarize(&[4]), "4");
        assert_eq!(summarize(&[0, 2, 4]), "0, 2, 4");
        assert_eq!(summarize(&[10, 11]), "10-11");
    }

    #[test]
    fn digest_depends_on_pixels_only() {
        let a = pixel_digest(&slice("1.1", 1, vec![1, 2, 3, 4])).unwrap();
        let b = pixel_digest(&slice("2.2", 7, vec![1, 2, 3, 4])).unwrap();
        let c = pixel_digest(&slice("1.1", 1, vec![1, 2, 3, 5])).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn pairs_slices_by_instance_number() {
        let original = series(vec![
            slice("1.2.3.1", 1, vec![0; 4]),
            slice("1.2.3.2", 2, vec![0; 4]),
            slice("1.2.3.3", 3, vec![0; 4]),
        ]);
        let modified = series(vec![
            slice("9.1", 1, vec![0; 4]),
            slice("9.2", 2, vec![1024; 4]),
            slice("9.3", 3, vec![0; 4]),
        ]);

        let report = compare(&original, &modified).unwrap();
        assert_eq!(report.changed, BTreeSet::from(["9.2".to_owned()]));
        assert_eq!(
            report.unchanged,
            BTreeSet::from(["9.1".to_owned(), "9.3".to_owned()])
        );
    }

    #[test]
    fn unmatched_slice_counts_as_changed() {
        let original = series(vec![slice("1.2.3.1", 1, vec![0; 4])]);
        let modified = series(vec![
            slice("9.1", 1, vec![0; 4]),
            slice("9.4", 4, vec![0; 4]),
        ]);
        let report = compare(&original, &modified).unwrap();
        assert!(report.changed.contains("9.4"));
        assert!(report.unchanged.contains("9.1"));
    }
}
