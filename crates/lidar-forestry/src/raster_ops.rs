//! Separable sliding-window filters shared by the ground classifier's grey
//! morphology and the tree detector's smoothing/peak-finding passes.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use lidar_common::Raster;

/// Sliding-window minimum over a 1-D slice, window radius `radius` (window
/// width `2*radius+1`), clamped at the array edges rather than padded.
/// Uses the standard monotonic-deque algorithm, O(n) regardless of radius.
fn sliding_extreme_1d(values: &[f32], radius: usize, take_min: bool) -> Vec<f32> {
    let n = values.len();
    let mut out = vec![0f32; n];
    let mut deque: std::collections::VecDeque<usize> = std::collections::VecDeque::new();

    // Two passes over an index range [0, n + radius) so that the deque has
    // "seen" radius cells ahead before we start emitting output for index i.
    let better = |a: f32, b: f32| if take_min { a <= b } else { a >= b };
    for i in 0..n {
        while let Some(&back) = deque.back() {
            if better(values[i], values[back]) {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(i);
        if let Some(&front) = deque.front() {
            if front + 2 * radius < i {
                deque.pop_front();
            }
        }
        if i >= radius {
            let centre = i - radius;
            while let Some(&front) = deque.front() {
                if front + radius < centre {
                    deque.pop_front();
                } else {
                    break;
                }
            }
            out[centre] = values[*deque.front().unwrap()];
        }
    }
    // Flush the tail: centres from n-radius..n still need their window,
    // which has already fully entered the deque.
    for centre in n.saturating_sub(radius)..n {
        let lo = centre.saturating_sub(radius);
        let hi = (centre + radius).min(n - 1);
        let mut best = values[lo];
        for &v in &values[lo..=hi] {
            if better(v, best) {
                best = v;
            }
        }
        out[centre] = best;
    }
    out
}

/// Runs `sliding_extreme_1d` over every row (or column, via `stride`/`len`)
/// of `source` in parallel, one worker thread per core, round-robining
/// lines across threads the way the ground-point filter tool distributes
/// points across `num_cpus::get()` workers.
fn parallel_lines(
    source: Arc<Vec<f32>>,
    line_count: usize,
    line_len: usize,
    stride: usize,
    radius: usize,
    take_min: bool,
) -> Vec<f32> {
    let num_procs = num_cpus::get().max(1).min(line_count.max(1));
    let (tx, rx) = mpsc::channel();
    for tid in 0..num_procs {
        let source = source.clone();
        let tx = tx.clone();
        thread::spawn(move || {
            for line in (0..line_count).filter(|l| l % num_procs == tid) {
                let base = line * stride;
                let values: Vec<f32> = (0..line_len).map(|i| source[base + i]).collect();
                let filtered = sliding_extreme_1d(&values, radius, take_min);
                tx.send((line, filtered)).unwrap();
            }
        });
    }
    drop(tx);

    let mut out = vec![0f32; line_count * line_len];
    for (line, filtered) in rx {
        let base = line * stride;
        for (i, v) in filtered.into_iter().enumerate() {
            out[base + i] = v;
        }
    }
    out
}

fn extreme_2d(raster: &Raster, radius: usize, take_min: bool) -> Raster {
    let mut out = Raster::with_nodata(
        raster.rows,
        raster.cols,
        raster.cell_size,
        raster.origin_x,
        raster.origin_y,
        raster.nodata,
    );
    if raster.rows == 0 || raster.cols == 0 {
        return out;
    }

    // Pass 1: along rows, each row handled by its own worker thread.
    let flat: Arc<Vec<f32>> = Arc::new(raster.values().to_vec());
    let row_filtered = parallel_lines(flat, raster.rows, raster.cols, raster.cols, radius, take_min);

    // Pass 2: along columns. Transpose first so each column is contiguous
    // and can be handed to `parallel_lines` the same way as a row.
    let mut transposed = vec![0f32; raster.rows * raster.cols];
    for row in 0..raster.rows {
        for col in 0..raster.cols {
            transposed[col * raster.rows + row] = row_filtered[row * raster.cols + col];
        }
    }
    let col_filtered = parallel_lines(
        Arc::new(transposed),
        raster.cols,
        raster.rows,
        raster.rows,
        radius,
        take_min,
    );
    for col in 0..raster.cols {
        for row in 0..raster.rows {
            out.set(row, col, col_filtered[col * raster.rows + row]);
        }
    }
    out
}

/// Flat-structuring-element grey erosion: minimum over a `(2r+1) x (2r+1)`
/// square neighbourhood, implemented as two separable 1-D passes.
pub fn erode(raster: &Raster, radius: usize) -> Raster {
    extreme_2d(raster, radius, true)
}

/// Flat-structuring-element grey dilation: maximum over a `(2r+1) x (2r+1)`
/// square neighbourhood.
pub fn dilate(raster: &Raster, radius: usize) -> Raster {
    extreme_2d(raster, radius, false)
}

/// Grey morphological opening (erosion followed by dilation), used by the
/// progressive morphological filter to estimate the bare-earth surface
/// under a window of side `2*radius+1`.
pub fn opening(raster: &Raster, radius: usize) -> Raster {
    dilate(&erode(raster, radius), radius)
}

/// Separable Gaussian blur with standard deviation `sigma`, truncated at
/// `3*sigma` cells. `sigma <= 0` is a no-op copy.
pub fn gaussian_blur(raster: &Raster, sigma: f64) -> Raster {
    if sigma <= 0.0 {
        return raster.clone();
    }
    let radius = (3.0 * sigma).ceil() as isize;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    let mut sum = 0.0;
    for d in -radius..=radius {
        let w = (-(d as f64 * d as f64) / (2.0 * sigma * sigma)).exp();
        kernel.push(w);
        sum += w;
    }
    for w in kernel.iter_mut() {
        *w /= sum;
    }

    let rows = raster.rows;
    let cols = raster.cols;
    let mut intermediate = vec![0f32; rows * cols];
    for row in 0..rows {
        for col in 0..cols {
            let mut acc = 0.0;
            for (k, d) in (-radius..=radius).enumerate() {
                let c = (col as isize + d).clamp(0, cols as isize - 1) as usize;
                acc += raster.get(row, c) as f64 * kernel[k];
            }
            intermediate[row * cols + col] = acc as f32;
        }
    }

    let mut out = Raster::with_nodata(rows, cols, raster.cell_size, raster.origin_x, raster.origin_y, raster.nodata);
    for row in 0..rows {
        for col in 0..cols {
            let mut acc = 0.0;
            for (k, d) in (-radius..=radius).enumerate() {
                let r = (row as isize + d).clamp(0, rows as isize - 1) as usize;
                acc += intermediate[r * cols + col] as f64 * kernel[k];
            }
            out.set(row, col, acc as f32);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erosion_of_flat_raster_is_unchanged() {
        let mut r = Raster::new(5, 5, 1.0, 0.0, 0.0);
        for row in 0..5 {
            for col in 0..5 {
                r.set(row, col, 3.0);
            }
        }
        let eroded = erode(&r, 1);
        for row in 0..5 {
            for col in 0..5 {
                assert_eq!(eroded.get(row, col), 3.0);
            }
        }
    }

    #[test]
    fn opening_removes_single_cell_spike() {
        let mut r = Raster::new(5, 5, 1.0, 0.0, 0.0);
        for row in 0..5 {
            for col in 0..5 {
                r.set(row, col, 0.0);
            }
        }
        r.set(2, 2, 10.0);
        let opened = opening(&r, 1);
        assert_eq!(opened.get(2, 2), 0.0);
    }
}
