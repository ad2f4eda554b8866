//! Progressive morphological filter (Zhang et al., 2003) ground
//! classification: build a min-elevation surface, open it with a sequence of
//! growing square windows, and drop points whose height above the opened
//! surface exceeds a window-dependent threshold.

use lidar_codec::PointCloud;
use lidar_common::{fill_nearest_neighbour, CoreError, CoreResult, Raster};
use serde::{Deserialize, Serialize};

use crate::raster_ops::opening;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PmfParams {
    pub cell_size: f64,
    pub slope: f64,
    pub max_window_size: f64,
    pub initial_distance: f64,
    pub max_distance: f64,
}

impl Default for PmfParams {
    fn default() -> Self {
        PmfParams {
            cell_size: 1.0,
            slope: 0.15,
            max_window_size: 33.0,
            initial_distance: 0.5,
            max_distance: 3.0,
        }
    }
}

/// `mask[i] == true` means point `i` survived every window as ground.
pub type GroundMask = Vec<bool>;

/// Window sizes `w_1 = 3, w_{k+1} = 2 w_k + 1`, stopped so that
/// `ceil(max_window_size / cell_size)` appears exactly once, as the final
/// element.
fn window_sizes(max_window_size: f64, cell_size: f64) -> Vec<usize> {
    let target = (max_window_size / cell_size).ceil().max(1.0) as usize;
    let mut windows = vec![3usize];
    while *windows.last().unwrap() < target {
        let next = 2 * windows.last().unwrap() + 1;
        windows.push(next);
    }
    if *windows.last().unwrap() != target {
        *windows.last_mut().unwrap() = target;
    }
    windows
}

/// Builds the min-elevation surface over the point subset selected by
/// `mask` (or every point, when `mask` is `None`), infilling unobserved
/// cells by nearest neighbour. Fails with `EmptyCloud` if no cell in the
/// grid receives a single point.
fn build_min_surface(
    cloud: &PointCloud,
    rows: usize,
    cols: usize,
    cell_size: f64,
    origin_x: f64,
    origin_y: f64,
    mask: Option<&[bool]>,
) -> CoreResult<Raster> {
    let mut raster = Raster::new(rows, cols, cell_size, origin_x, origin_y);
    let mut any = false;
    for i in 0..cloud.point_count() {
        if let Some(m) = mask {
            if !m[i] {
                continue;
            }
        }
        let (row, col) = raster.row_col_for(cloud.x[i], cloud.y[i]);
        let z = cloud.z[i] as f32;
        if raster.is_nodata_at(row, col) || z < raster.get(row, col) {
            raster.set(row, col, z);
        }
        any = true;
    }
    if !any {
        return Err(CoreError::EmptyCloud);
    }
    fill_nearest_neighbour(&mut raster);
    Ok(raster)
}

/// Classifies every point in `cloud` as ground (`true`) or non-ground
/// (`false`). An empty cloud yields an empty mask; a single-point cloud is
/// trivially all-ground, since a lone cell's opened surface equals the
/// point's own elevation.
pub fn classify_ground(cloud: &PointCloud, params: &PmfParams) -> CoreResult<GroundMask> {
    let n = cloud.point_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let bounds = cloud
        .planar_bounds()
        .expect("n > 0 checked above, so planar_bounds is Some");
    let cell_size = params.cell_size.max(1e-6);
    let cols = ((bounds.width() / cell_size).ceil() as usize + 1).max(1);
    let rows = ((bounds.height() / cell_size).ceil() as usize + 1).max(1);

    let mut ground_mask = vec![true; n];
    let mut surface = build_min_surface(
        cloud,
        rows,
        cols,
        cell_size,
        bounds.min_x,
        bounds.min_y,
        None,
    )?;

    let windows = window_sizes(params.max_window_size, cell_size);
    for (k, &w) in windows.iter().enumerate() {
        let radius = (w / 2).max(1);
        let opened = opening(&surface, radius);

        let threshold = if k == 0 {
            params.initial_distance
        } else {
            (params.initial_distance + params.slope * w as f64 * cell_size)
                .min(params.max_distance)
        };

        for i in 0..n {
            let (row, col) = opened.row_col_for(cloud.x[i], cloud.y[i]);
            let z_surf = opened.get(row, col) as f64;
            let h = cloud.z[i] - z_surf;
            if h > threshold {
                ground_mask[i] = false;
            }
        }

        surface = build_min_surface(
            cloud,
            rows,
            cols,
            cell_size,
            bounds.min_x,
            bounds.min_y,
            Some(&ground_mask),
        )?;
    }

    Ok(ground_mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_ground_with_tree(n_ground: usize, spacing: f64) -> PointCloud {
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut z = Vec::new();
        for i in 0..n_ground {
            for j in 0..n_ground {
                x.push(i as f64 * spacing);
                y.push(j as f64 * spacing);
                z.push(0.0);
            }
        }
        // A single tall spike near the middle of the plot.
        let mid = (n_ground as f64 / 2.0) * spacing;
        x.push(mid);
        y.push(mid);
        z.push(15.0);

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
    fn empty_cloud_yields_empty_mask() {
        let cloud = PointCloud {
            header: None,
            x: vec![],
            y: vec![],
            z: vec![],
            intensity: None,
            classification: None,
            return_number: None,
            number_of_returns: None,
        };
        let mask = classify_ground(&cloud, &PmfParams::default()).unwrap();
        assert!(mask.is_empty());
    }

    #[test]
    fn single_point_is_ground() {
        let cloud = PointCloud {
            header: None,
            x: vec![0.0],
            y: vec![0.0],
            z: vec![5.0],
            intensity: None,
            classification: None,
            return_number: None,
            number_of_returns: None,
        };
        let mask = classify_ground(&cloud, &PmfParams::default()).unwrap();
        assert_eq!(mask, vec![true]);
    }

    #[test]
    fn tall_spike_above_flat_ground_is_rejected() {
        let cloud = flat_ground_with_tree(20, 1.0);
        let params = PmfParams {
            cell_size: 1.0,
            max_window_size: 9.0,
            ..PmfParams::default()
        };
        let mask = classify_ground(&cloud, &params).unwrap();
        let last = *mask.last().unwrap();
        assert!(!last, "the 15m spike should be classified non-ground");
        let ground_count = mask.iter().filter(|&&g| g).count();
        assert_eq!(ground_count, mask.len() - 1);
    }

    #[test]
    fn window_sequence_ends_with_target_exactly_once() {
        let windows = window_sizes(33.0, 1.0);
        assert_eq!(windows.last(), Some(&33));
        assert_eq!(windows.iter().filter(|&&w| w == 33).count(), 1);
    }

}
