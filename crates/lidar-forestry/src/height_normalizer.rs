//! Builds a bare-earth DEM from classified ground points, a DSM from the
//! full point cloud, and the canopy height model CHM = max(DSM - DEM, 0).

use lidar_codec::PointCloud;
use lidar_common::{fill_nearest_neighbour, CoreError, CoreResult, Raster};
use serde::{Deserialize, Serialize};

use crate::interpolate::{interpolate_idw, interpolate_tin, GridSpec, IdwParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationMethod {
    Idw,
    Tin,
}

#[derive(Clone, Debug)]
pub struct NormalizerParams {
    pub cell_size: f64,
    pub method: InterpolationMethod,
    pub idw: IdwParams,
    /// When `true` and return-number data is present, the DSM only
    /// considers first returns; otherwise every point contributes.
    pub dsm_first_returns_only: bool,
}

impl Default for NormalizerParams {
    fn default() -> Self {
        NormalizerParams {
            cell_size: 1.0,
            method: InterpolationMethod::Tin,
            idw: IdwParams::default(),
            dsm_first_returns_only: true,
        }
    }
}

pub struct HeightNormalizerResult {
    pub dem: Raster,
    pub dsm: Raster,
    pub chm: Raster,
    /// `z - dem(row, col)` for every point in the input cloud, in order.
    pub z_normalized: Vec<f64>,
}

fn grid_for(cloud: &PointCloud, cell_size: f64) -> (GridSpec, f64, f64) {
    let bounds = cloud
        .planar_bounds()
        .expect("caller has already checked the cloud is non-empty");
    let cols = ((bounds.width() / cell_size).ceil() as usize + 1).max(1);
    let rows = ((bounds.height() / cell_size).ceil() as usize + 1).max(1);
    (
        GridSpec {
            rows,
            cols,
            cell_size,
            origin_x: bounds.min_x,
            origin_y: bounds.min_y,
        },
        bounds.min_x,
        bounds.min_y,
    )
}

/// Builds the DSM as the maximum z observed in each cell. When
/// `first_returns_only` is set and return-number data exists, only
/// `return_number == 1` points are considered; if no first returns are
/// observed in a cell the fallback is every point regardless of return
/// number, so sparse first-return coverage never leaves needless nodata.
fn build_dsm(cloud: &PointCloud, grid: GridSpec, first_returns_only: bool) -> Raster {
    let mut dsm = Raster::new(grid.rows, grid.cols, grid.cell_size, grid.origin_x, grid.origin_y);
    let use_first_returns = first_returns_only && cloud.return_number.is_some();

    if use_first_returns {
        let returns = cloud.return_number.as_ref().unwrap();
        for i in 0..cloud.point_count() {
            if returns[i] != 1 {
                continue;
            }
            let (row, col) = dsm.row_col_for(cloud.x[i], cloud.y[i]);
            let z = cloud.z[i] as f32;
            if dsm.is_nodata_at(row, col) || z > dsm.get(row, col) {
                dsm.set(row, col, z);
            }
        }
        // Cells with no first return at all fall back to every point.
        let touched: Vec<bool> = (0..grid.rows * grid.cols)
            .map(|idx| !dsm.values()[idx].is_nan())
            .collect();
        for i in 0..cloud.point_count() {
            let (row, col) = dsm.row_col_for(cloud.x[i], cloud.y[i]);
            if touched[row * grid.cols + col] {
                continue;
            }
            let z = cloud.z[i] as f32;
            if dsm.is_nodata_at(row, col) || z > dsm.get(row, col) {
                dsm.set(row, col, z);
            }
        }
    } else {
        for i in 0..cloud.point_count() {
            let (row, col) = dsm.row_col_for(cloud.x[i], cloud.y[i]);
            let z = cloud.z[i] as f32;
            if dsm.is_nodata_at(row, col) || z > dsm.get(row, col) {
                dsm.set(row, col, z);
            }
        }
    }

    fill_nearest_neighbour(&mut dsm);
    dsm
}

/// Produces the DEM/DSM/CHM triple and per-point normalized heights for
/// `cloud`, given a ground/non-ground `ground_mask` from
/// [`crate::ground_classifier::classify_ground`].
pub fn normalize_height(
    cloud: &PointCloud,
    ground_mask: &[bool],
    params: &NormalizerParams,
) -> CoreResult<HeightNormalizerResult> {
    if cloud.is_empty() {
        return Err(CoreError::EmptyCloud);
    }
    if ground_mask.len() != cloud.point_count() {
        return Err(CoreError::InvalidParam {
            name: "ground_mask".to_string(),
            reason: "length must match the point cloud's point count".to_string(),
        });
    }

    let ground_points: Vec<(f64, f64, f64)> = (0..cloud.point_count())
        .filter(|&i| ground_mask[i])
        .map(|i| (cloud.x[i], cloud.y[i], cloud.z[i]))
        .collect();
    if ground_points.is_empty() {
        return Err(CoreError::NoGroundPoints);
    }

    let (grid, _origin_x, _origin_y) = grid_for(cloud, params.cell_size);

    let dem = match params.method {
        InterpolationMethod::Idw => interpolate_idw(&ground_points, grid, &params.idw),
        InterpolationMethod::Tin => interpolate_tin(&ground_points, grid, &params.idw),
    };

    let dsm = build_dsm(cloud, grid, params.dsm_first_returns_only);

    let mut chm = Raster::new(grid.rows, grid.cols, grid.cell_size, grid.origin_x, grid.origin_y);
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let height = (dsm.get(row, col) - dem.get(row, col)).max(0.0);
            chm.set(row, col, if height.is_finite() { height } else { f32::NAN });
        }
    }
    fill_nearest_neighbour(&mut chm);

    let z_normalized = (0..cloud.point_count())
        .map(|i| {
            let (row, col) = dem.row_col_for(cloud.x[i], cloud.y[i]);
            cloud.z[i] - dem.get(row, col) as f64
        })
        .collect();

    Ok(HeightNormalizerResult {
        dem,
        dsm,
        chm,
        z_normalized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_ground_cloud(n: usize) -> PointCloud {
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut z = Vec::new();
        for i in 0..n {
            for j in 0..n {
                x.push(i as f64);
                y.push(j as f64);
                z.push(10.0);
            }
        }
        x.push(n as f64 / 2.0);
        y.push(n as f64 / 2.0);
        z.push(25.0); // a 15m-tall tree above the 10m ground plane

        PointCloud {
            header: None,
            x,
            y,
            z,
            intensity: None,
            classification: None,
            return_number: None,
            number_of_returns: None,
        }
    }

    #[test]
    fn empty_cloud_is_rejected() {
        let cloud = PointCloud::default();
        let err = normalize_height(&cloud, &[], &NormalizerParams::default()).unwrap_err();
        assert_eq!(err.code(), "EMPTY_CLOUD");
    }

    #[test]
    fn chm_reports_tree_height_above_flat_ground() {
        let cloud = flat_ground_cloud(10);
        let n = cloud.point_count();
        let mut mask = vec![true; n];
        *mask.last_mut().unwrap() = false; // the tree point is non-ground

        let params = NormalizerParams {
            method: InterpolationMethod::Idw,
            ..NormalizerParams::default()
        };
        let result = normalize_height(&cloud, &mask, &params).unwrap();
        let tree_idx = n - 1;
        let (row, col) = result.dem.row_col_for(cloud.x[tree_idx], cloud.y[tree_idx]);
        assert!((result.chm.get(row, col) - 15.0).abs() < 1.0);
    }

    #[test]
    fn all_non_ground_fails_with_no_ground_points() {
        let cloud = flat_ground_cloud(5);
        let mask = vec![false; cloud.point_count()];
        let err = normalize_height(&cloud, &mask, &NormalizerParams::default()).unwrap_err();
        assert_eq!(err.code(), "NO_GROUND_POINTS");
    }
}
