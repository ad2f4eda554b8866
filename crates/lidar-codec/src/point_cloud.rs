use crate::header::LasHeader;
use lidar_common::{Bounds2D, CoreError, CoreResult};

/// Which optional per-point columns a caller wants materialized. x/y/z are
/// always read; the rest are costed independently since a validator or a
/// density pass may only need geometry.
#[derive(Clone, Copy, Debug)]
pub struct ColumnSelect {
    pub intensity: bool,
    pub classification: bool,
    pub return_number: bool,
    pub number_of_returns: bool,
}

impl ColumnSelect {
    pub fn all() -> ColumnSelect {
        ColumnSelect {
            intensity: true,
            classification: true,
            return_number: true,
            number_of_returns: true,
        }
    }

    pub fn geometry_only() -> ColumnSelect {
        ColumnSelect {
            intensity: false,
            classification: false,
            return_number: false,
            number_of_returns: false,
        }
    }
}

impl Default for ColumnSelect {
    fn default() -> Self {
        ColumnSelect::all()
    }
}

/// An in-memory point cloud, structure-of-arrays. `x`, `y`, `z` are always
/// present and of equal length; the remaining columns are present only when
/// requested via `ColumnSelect` and present in the source file's point
/// format.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    pub header: Option<LasHeader>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub intensity: Option<Vec<u16>>,
    pub classification: Option<Vec<u8>>,
    pub return_number: Option<Vec<u8>>,
    pub number_of_returns: Option<Vec<u8>>,
}

impl PointCloud {
    pub fn point_count(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Planar bounds derived from the x/y columns (not the header, which may
    /// have been computed over a superset of points before filtering).
    pub fn planar_bounds(&self) -> Option<Bounds2D> {
        if self.x.is_empty() {
            return None;
        }
        let (mut min_x, mut max_x) = (f64::MAX, f64::MIN);
        let (mut min_y, mut max_y) = (f64::MAX, f64::MIN);
        for i in 0..self.x.len() {
            min_x = min_x.min(self.x[i]);
            max_x = max_x.max(self.x[i]);
            min_y = min_y.min(self.y[i]);
            max_y = max_y.max(self.y[i]);
        }
        Some(Bounds2D::new(min_x, min_y, max_x, max_y))
    }

    /// Checks the structure-of-arrays length invariant (§3): every present
    /// column must have exactly `point_count()` elements.
    pub fn check_invariants(&self) -> CoreResult<()> {
        let n = self.point_count();
        if self.y.len() != n || self.z.len() != n {
            return Err(CoreError::ReadFailed(
                "x/y/z column lengths disagree".to_string(),
            ));
        }
        for (name, col) in [
            ("intensity", self.intensity.as_ref().map(|v| v.len())),
            (
                "classification",
                self.classification.as_ref().map(|v| v.len()),
            ),
            (
                "return_number",
                self.return_number.as_ref().map(|v| v.len()),
            ),
            (
                "number_of_returns",
                self.number_of_returns.as_ref().map(|v| v.len()),
            ),
        ] {
            if let Some(len) = col {
                if len != n {
                    return Err(CoreError::ReadFailed(format!(
                        "{} column length disagrees with point count",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn append_point(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        intensity: u16,
        classification: u8,
        return_number: u8,
        number_of_returns: u8,
    ) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        if let Some(v) = self.intensity.as_mut() {
            v.push(intensity);
        }
        if let Some(v) = self.classification.as_mut() {
            v.push(classification);
        }
        if let Some(v) = self.return_number.as_mut() {
            v.push(return_number);
        }
        if let Some(v) = self.number_of_returns.as_mut() {
            v.push(number_of_returns);
        }
    }
}
