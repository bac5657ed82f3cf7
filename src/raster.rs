//! Binary rasterization of planar contours.
//!
//! Voxel coordinates address pixel centres: pixel `(row, col)` sits at
//! `(x = col, y = row)`. A pixel is filled when its centre falls inside the
//! polygon under the even-odd rule, with edge crossings counted half-open so
//! that an axis-aligned rectangle `[x0, x1) x [y0, y1)` covers exactly
//! `(x1 - x0) * (y1 - y0)` pixels.

use ndarray::{Array2, s};

/// Fill the polygon `vertices` (voxel `[x, y]`) into a `shape = (rows, cols)` raster.
pub fn fill_polygon(vertices: &[[f64; 2]], shape: (usize, usize)) -> Array2<bool> {
    let (rows, cols) = shape;
    let mut mask = Array2::from_elem(shape, false);
    if vertices.len() < 3 || rows == 0 || cols == 0 {
        return mask;
    }

    let (min_y, max_y) = vertices
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v[1]), hi.max(v[1]))
        });
    if !min_y.is_finite() || !max_y.is_finite() || max_y < 0.0 {
        return mask;
    }

    let first_row = min_y.ceil().max(0.0) as usize;
    let last_row = (max_y.ceil() as usize).min(rows);
    let mut crossings = Vec::with_capacity(vertices.len());

    for row in first_row..last_row {
        let y = row as f64;
        crossings.clear();

        for (i, p) in vertices.iter().enumerate() {
            let q = &vertices[(i + 1) % vertices.len()];
            if (p[1] <= y && q[1] > y) || (q[1] <= y && p[1] > y) {
                crossings.push(p[0] + (y - p[1]) * (q[0] - p[0]) / (q[1] - p[1]));
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            let start = span[0].ceil().max(0.0);
            let end = span[1].ceil().min(cols as f64);
            if end <= start {
                continue;
            }
            mask.slice_mut(s![row, start as usize..end as usize]).fill(true);
        }
    }

    mask
}

/// Grow `mask` by `iterations` steps of the 4-connected cross.
pub fn dilate(mask: &Array2<bool>, iterations: usize) -> Array2<bool> {
    let mut current = mask.clone();
    let (rows, cols) = mask.dim();

    for _ in 0..iterations {
        let mut next = current.clone();
        if rows > 1 {
            next.slice_mut(s![1.., ..])
                .zip_mut_with(&current.slice(s![..rows - 1, ..]), |o, &i| *o |= i);
            next.slice_mut(s![..rows - 1, ..])
                .zip_mut_with(&current.slice(s![1.., ..]), |o, &i| *o |= i);
        }
        if cols > 1 {
            next.slice_mut(s![.., 1..])
                .zip_mut_with(&current.slice(s![.., ..cols - 1]), |o, &i| *o |= i);
            next.slice_mut(s![.., ..cols - 1])
                .zip_mut_with(&current.slice(s![.., 1..]), |o, &i| *o |= i);
        }
        if next == current {
            break;
        }
        current = next;
    }

    current
}

/// Area enclosed by a simple polygon, or 0 when the polygon is not simple.
pub fn polygon_area(points: &[[f64; 2]]) -> f64 {
    let ring = normalized_ring(points);
    if !is_simple(&ring) {
        return 0.0;
    }
    shoelace(&ring)
}

fn shoelace(ring: &[[f64; 2]]) -> f64 {
    let twice_area: f64 = ring
        .iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(a, b)| a[0] * b[1] - b[0] * a[1])
        .sum();
    twice_area.abs() / 2.0
}

/// Drop repeated consecutive vertices and an explicit closing vertex.
fn normalized_ring(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut ring: Vec<[f64; 2]> = Vec::with_capacity(points.len());
    for p in points {
        if ring.last() != Some(p) {
            ring.push(*p);
        }
    }
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// At least three vertices, non-zero area and no crossing between
/// non-adjacent edges.
fn is_simple(ring: &[[f64; 2]]) -> bool {
    let n = ring.len();
    if n < 3 || ring.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return false;
    }
    if shoelace(ring) == 0.0 {
        return false;
    }

    let edge = |i: usize| (ring[i], ring[(i + 1) % n]);
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (p1, p2) = edge(i);
            let (q1, q2) = edge(j);
            if segments_intersect(p1, p2, q1, q2) {
                return false;
            }
        }
    }
    true
}

fn orientation(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn within_bounds(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> bool {
    p[0] >= a[0].min(b[0])
        && p[0] <= a[0].max(b[0])
        && p[1] >= a[1].min(b[1])
        && p[1] <= a[1].max(b[1])
}

fn segments_intersect(p1: [f64; 2], p2: [f64; 2], q1: [f64; 2], q2: [f64; 2]) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if d1 * d2 < 0.0 && d3 * d4 < 0.0 {
        return true;
    }

    (d1 == 0.0 && within_bounds(q1, q2, p1))
        || (d2 == 0.0 && within_bounds(q1, q2, p2))
        || (d3 == 0.0 && within_bounds(p1, p2, q1))
        || (d4 == 0.0 && within_bounds(p1, p2, q2))
}
