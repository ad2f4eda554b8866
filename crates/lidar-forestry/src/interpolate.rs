//! Gridding of scattered `(x, y, z)` samples onto a raster, by inverse
//! distance weighting or Delaunay-triangulated linear interpolation.

use lidar_common::{fill_nearest_neighbour, DistanceMetric, FixedRadiusSearch2D, Raster};
use log::warn;

use crate::delaunay::{self, DPoint};

#[derive(Clone, Copy, Debug)]
pub struct IdwParams {
    pub power: f64,
    pub search_radius: f64,
    pub min_neighbours: usize,
    pub max_neighbours: usize,
}

impl Default for IdwParams {
    fn default() -> Self {
        IdwParams {
            power: 2.0,
            search_radius: 2.5,
            min_neighbours: 1,
            max_neighbours: 12,
        }
    }
}

/// Grid geometry shared by every interpolator so that DEM/DSM/CHM rasters
/// produced from the same point cloud line up cell-for-cell.
#[derive(Clone, Copy, Debug)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub cell_size: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

/// Inverse-distance-weighted gridding. Cells with fewer than
/// `min_neighbours` points within `search_radius` fall back to a k-nearest
/// query for `max_neighbours` points; cells that still find nothing are left
/// as nodata and filled by nearest-neighbour infill at the end, so the
/// output is always fully populated.
pub fn interpolate_idw(points: &[(f64, f64, f64)], grid: GridSpec, params: &IdwParams) -> Raster {
    let mut index: FixedRadiusSearch2D<f64> =
        FixedRadiusSearch2D::new(params.search_radius, DistanceMetric::Euclidean);
    for &(x, y, z) in points {
        index.insert(x, y, z);
    }

    let mut raster = Raster::new(grid.rows, grid.cols, grid.cell_size, grid.origin_x, grid.origin_y);
    if points.is_empty() {
        return raster;
    }

    const EPS: f64 = 1e-6;
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let (cx, cy) = raster.cell_centre(row, col);
            let mut hits = index.search(cx, cy);
            if hits.len() < params.min_neighbours {
                hits = index.knn_search(cx, cy, params.max_neighbours);
            }
            if hits.is_empty() {
                continue;
            }

            // An exact hit (distance ~0) takes its value directly rather than
            // blowing up the 1/d^p weight.
            if let Some(&(z, _)) = hits.iter().find(|&&(_, d)| d <= EPS) {
                raster.set(row, col, z as f32);
                continue;
            }

            let mut weighted_sum = 0.0;
            let mut weight_total = 0.0;
            for &(z, dist) in &hits {
                let w = 1.0 / dist.max(EPS).powf(params.power);
                weighted_sum += w * z;
                weight_total += w;
            }
            raster.set(row, col, (weighted_sum / weight_total) as f32);
        }
    }

    fill_nearest_neighbour(&mut raster);
    raster
}

/// Barycentric coordinates of `(x, y)` in triangle `(a, b, c)`, or `None`
/// when the triangle is degenerate (zero area).
fn barycentric(x: f64, y: f64, a: &DPoint, b: &DPoint, c: &DPoint) -> Option<(f64, f64, f64)> {
    let denom = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if denom.abs() < 1e-12 {
        return None;
    }
    let l1 = ((b.y - c.y) * (x - c.x) + (c.x - b.x) * (y - c.y)) / denom;
    let l2 = ((c.y - a.y) * (x - c.x) + (a.x - c.x) * (y - c.y)) / denom;
    let l3 = 1.0 - l1 - l2;
    Some((l1, l2, l3))
}

/// Delaunay-triangulated linear interpolation: rasterizes each triangle of
/// the surface mesh directly, so every cell it touches is computed in a
/// single pass rather than via a point-location query per cell. Cells
/// outside the convex hull are left as nodata, then infilled by nearest
/// neighbour. Falls back to IDW when the point set has no triangulation
/// (fewer than three points, or all points collinear).
pub fn interpolate_tin(
    points: &[(f64, f64, f64)],
    grid: GridSpec,
    fallback: &IdwParams,
) -> Raster {
    if points.len() < 3 {
        return interpolate_idw(points, grid, fallback);
    }

    let dpoints: Vec<DPoint> = points.iter().map(|&(x, y, _)| DPoint { x, y }).collect();
    let triangulation = match delaunay::triangulate(&dpoints) {
        Some(t) => t,
        None => {
            warn!(
                "DEGENERATE_TRIANGULATION: point set has no valid Delaunay triangulation, falling back to IDW"
            );
            return interpolate_idw(points, grid, fallback);
        }
    };

    let mut raster = Raster::new(grid.rows, grid.cols, grid.cell_size, grid.origin_x, grid.origin_y);

    for t in 0..triangulation.len() {
        let [ia, ib, ic] = triangulation.points_of_triangle(t);
        let a = dpoints[ia];
        let b = dpoints[ib];
        let c = dpoints[ic];
        let (za, zb, zc) = (points[ia].2, points[ib].2, points[ic].2);

        let min_x = a.x.min(b.x).min(c.x);
        let max_x = a.x.max(b.x).max(c.x);
        let min_y = a.y.min(b.y).min(c.y);
        let max_y = a.y.max(b.y).max(c.y);

        let (row_lo, col_lo) = raster.row_col_for(min_x, min_y);
        let (row_hi, col_hi) = raster.row_col_for(max_x, max_y);
        let (row_lo, row_hi) = (row_lo.min(row_hi), row_lo.max(row_hi));
        let (col_lo, col_hi) = (col_lo.min(col_hi), col_lo.max(col_hi));

        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                let (cx, cy) = raster.cell_centre(row, col);
                if let Some((l1, l2, l3)) = barycentric(cx, cy, &a, &b, &c) {
                    // Small negative tolerance absorbs edge/vertex round-off
                    // so shared triangle edges don't leave a seam of nodata.
                    if l1 >= -1e-9 && l2 >= -1e-9 && l3 >= -1e-9 {
                        let z = l1 * za + l2 * zb + l3 * zc;
                        raster.set(row, col, z as f32);
                    }
                }
            }
        }
    }

    fill_nearest_neighbour(&mut raster);
    raster
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> GridSpec {
        GridSpec {
            rows: 10,
            cols: 10,
            cell_size: 1.0,
            origin_x: 0.0,
            origin_y: 0.0,
        }
    }

    #[test]
    fn idw_exact_hit_reproduces_input_value() {
        let points = vec![(5.5, 5.5, 42.0), (1.5, 1.5, 1.0), (8.5, 2.5, 2.0)];
        let raster = interpolate_idw(&points, small_grid(), &IdwParams::default());
        let (row, col) = raster.row_col_for(5.5, 5.5);
        assert!((raster.get(row, col) - 42.0).abs() < 1e-6);
    }

    #[test]
    fn idw_empty_input_is_all_nodata() {
        let raster = interpolate_idw(&[], small_grid(), &IdwParams::default());
        assert!(raster.is_nodata_at(0, 0));
    }

    #[test]
    fn tin_flat_plane_interpolates_to_constant_height() {
        let points = vec![
            (0.5, 0.5, 3.0),
            (9.5, 0.5, 3.0),
            (9.5, 9.5, 3.0),
            (0.5, 9.5, 3.0),
            (5.0, 5.0, 3.0),
        ];
        let raster = interpolate_tin(&points, small_grid(), &IdwParams::default());
        let (row, col) = raster.row_col_for(5.0, 5.0);
        assert!((raster.get(row, col) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn tin_falls_back_to_idw_on_collinear_points() {
        let points = vec![(0.0, 0.0, 1.0), (1.0, 0.0, 2.0), (2.0, 0.0, 3.0)];
        let raster = interpolate_tin(&points, small_grid(), &IdwParams::default());
        // Should not panic and should produce a fully-populated raster.
        assert!(!raster.is_nodata_at(5, 5));
    }
}
