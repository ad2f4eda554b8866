use serde::{Deserialize, Serialize};

/// A 2-D axis-aligned grid over a bounding rectangle with cell size `cell_size`.
///
/// Cell `(row, col)` covers `x in [origin_x + col*cell_size, origin_x + (col+1)*cell_size)`
/// and `y in [origin_y + row*cell_size, origin_y + (row+1)*cell_size)`; row 0 is the
/// southernmost row, matching `origin` being the (min_x, min_y) world corner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Raster {
    pub rows: usize,
    pub cols: usize,
    pub cell_size: f64,
    pub origin_x: f64,
    pub origin_y: f64,
    pub nodata: f32,
    data: Vec<f32>,
}

impl Raster {
    pub fn new(rows: usize, cols: usize, cell_size: f64, origin_x: f64, origin_y: f64) -> Raster {
        Raster::with_nodata(rows, cols, cell_size, origin_x, origin_y, f32::NAN)
    }

    pub fn with_nodata(
        rows: usize,
        cols: usize,
        cell_size: f64,
        origin_x: f64,
        origin_y: f64,
        nodata: f32,
    ) -> Raster {
        Raster {
            rows,
            cols,
            cell_size,
            origin_x,
            origin_y,
            nodata,
            data: vec![nodata; rows * cols],
        }
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        if row >= self.rows || col >= self.cols {
            return self.nodata;
        }
        self.data[self.index(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        if row < self.rows && col < self.cols {
            let idx = self.index(row, col);
            self.data[idx] = value;
        }
    }

    pub fn is_nodata_at(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_nan()
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Row/column of the cell covering world coordinate `(x, y)`, clamped to the
    /// grid extent. A point on the exact boundary between two cells belongs to
    /// the cell whose lower edge it lies on (`floor`).
    pub fn row_col_for(&self, x: f64, y: f64) -> (usize, usize) {
        let col = ((x - self.origin_x) / self.cell_size).floor();
        let row = ((y - self.origin_y) / self.cell_size).floor();
        let col = col.clamp(0.0, (self.cols.max(1) - 1) as f64) as usize;
        let row = row.clamp(0.0, (self.rows.max(1) - 1) as f64) as usize;
        (row, col)
    }

    /// World coordinate of the centre of cell `(row, col)`.
    pub fn cell_centre(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.cell_size,
            self.origin_y + (row as f64 + 0.5) * self.cell_size,
        )
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Fills every nodata (NaN) cell of `raster` with the value of the nearest
/// observed cell, measured by Euclidean pixel distance. Ties are broken by
/// `(row, col)` lexicographic order. This is the single infill routine shared
/// by the PMF min-surface build, IDW's uncovered-cell fallback, and the
/// height normalizer's NaN/Inf cleanup.
///
/// Implemented as a multi-source expanding-ring search from each unobserved
/// cell rather than an O(n^2) all-pairs scan, since rasters here run into the
/// tens of millions of cells for large point clouds.
pub fn fill_nearest_neighbour(raster: &mut Raster) {
    let rows = raster.rows;
    let cols = raster.cols;
    if rows == 0 || cols == 0 {
        return;
    }

    let observed: Vec<bool> = (0..rows * cols).map(|i| !raster.data[i].is_nan()).collect();
    if observed.iter().all(|&o| !o) {
        // Nothing to infill from; leave as nodata.
        return;
    }
    if observed.iter().all(|&o| o) {
        return;
    }

    let mut filled = raster.data.clone();
    for row in 0..rows {
        for col in 0..cols {
            let idx = row * cols + col;
            if observed[idx] {
                continue;
            }
            let (best_row, best_col) = nearest_observed(&observed, rows, cols, row, col);
            filled[idx] = raster.data[best_row * cols + best_col];
        }
    }
    raster.data = filled;
}

/// Expanding-ring search for the nearest observed cell to `(row, col)`.
/// Ring radius grows in Chebyshev distance; once a ring yields at least one
/// observed cell we must also scan one extra ring outward, since a
/// Euclidean-nearer cell can sit in the next Chebyshev ring.
fn nearest_observed(
    observed: &[bool],
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
) -> (usize, usize) {
    let max_radius = rows.max(cols);
    let mut best: Option<(usize, usize)> = None;
    let mut best_dist_sq = f64::MAX;
    let mut found_radius: Option<usize> = None;

    for radius in 0..=max_radius {
        if let Some(r) = found_radius {
            if radius > r + 1 {
                break;
            }
        }
        let row_lo = row.saturating_sub(radius);
        let row_hi = (row + radius).min(rows - 1);
        let col_lo = col.saturating_sub(radius);
        let col_hi = (col + radius).min(cols - 1);

        for r in row_lo..=row_hi {
            for c in col_lo..=col_hi {
                // Only the border of the square (cells newly entering this ring).
                let on_border = r == row_lo || r == row_hi || c == col_lo || c == col_hi;
                if !on_border {
                    continue;
                }
                if !observed[r * cols + c] {
                    continue;
                }
                let dr = r as f64 - row as f64;
                let dc = c as f64 - col as f64;
                let dist_sq = dr * dr + dc * dc;
                let better = dist_sq < best_dist_sq
                    || (dist_sq == best_dist_sq
                        && best.map_or(true, |(br, bc)| (r, c) < (br, bc)));
                if better {
                    best = Some((r, c));
                    best_dist_sq = dist_sq;
                }
            }
        }
        if best.is_some() && found_radius.is_none() {
            found_radius = Some(radius);
        }
    }
    best.expect("at least one observed cell exists by precondition")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_col_clips_to_grid() {
        let r = Raster::new(10, 10, 1.0, 0.0, 0.0);
        assert_eq!(r.row_col_for(-5.0, -5.0), (0, 0));
        assert_eq!(r.row_col_for(100.0, 100.0), (9, 9));
    }

    #[test]
    fn infill_picks_nearest_by_lex_order_on_ties() {
        let mut r = Raster::new(3, 3, 1.0, 0.0, 0.0);
        r.set(0, 0, 1.0);
        r.set(0, 2, 2.0);
        // centre cell (1,1) is equidistant (dist_sq=2) from both corners;
        // (0,0) is lexicographically smaller than (0,2).
        fill_nearest_neighbour(&mut r);
        assert_eq!(r.get(1, 1), 1.0);
    }

    #[test]
    fn infill_leaves_all_nodata_raster_untouched() {
        let mut r = Raster::new(2, 2, 1.0, 0.0, 0.0);
        fill_nearest_neighbour(&mut r);
        assert!(r.is_nodata_at(0, 0));
    }
}
