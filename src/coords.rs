use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("contour has {0} values, which is not a multiple of 3")]
    NotTriplets(usize),
}

/// Map flat millimetre `(x, y, z)` triplets into in-plane voxel coordinates.
///
/// `origin` is the position of the first voxel and `spacing` is the
/// `(x, y)` distance between voxel centres. No rounding happens here.
pub fn mm_to_voxel(
    points_mm: &[f64],
    origin: [f64; 3],
    spacing: (f64, f64),
) -> Result<Vec<[f64; 2]>, CoordinateError> {
    if points_mm.len() % 3 != 0 {
        return Err(CoordinateError::NotTriplets(points_mm.len()));
    }

    Ok(points_mm
        .chunks_exact(3)
        .map(|p| {
            [
                (p[0] - origin[0]) / spacing.0,
                (p[1] - origin[1]) / spacing.1,
            ]
        })
        .collect())
}

/// Drop the z component of flat millimetre triplets.
pub(crate) fn planar_mm(points_mm: &[f64]) -> Result<Vec<[f64; 2]>, CoordinateError> {
    mm_to_voxel(points_mm, [0.0; 3], (1.0, 1.0))
}
