use kdtree::distance::squared_euclidean;
use kdtree::KdTree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceMetric {
    Euclidean,
    SquaredEuclidean,
}

/// A 2-D spatial index supporting fixed-radius and k-nearest-neighbour
/// queries over scattered `(x, y)` samples, each carrying a payload `T`.
/// Backed by `kdtree::KdTree`, matching the fixed-radius search structure the
/// ground classifier and interpolators in this pipeline share.
pub struct FixedRadiusSearch2D<T: Clone> {
    tree: KdTree<f64, T, [f64; 2]>,
    radius: f64,
    metric: DistanceMetric,
}

impl<T: Clone> FixedRadiusSearch2D<T> {
    pub fn new(radius: f64, metric: DistanceMetric) -> FixedRadiusSearch2D<T> {
        FixedRadiusSearch2D {
            tree: KdTree::new(2),
            radius,
            metric,
        }
    }

    pub fn insert(&mut self, x: f64, y: f64, data: T) {
        let _ = self.tree.add([x, y], data);
    }

    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Every indexed point within `radius` of `(x, y)`, as `(data, distance)`
    /// pairs. Distance is squared or linear Euclidean depending on `metric`.
    pub fn search(&self, x: f64, y: f64) -> Vec<(T, f64)> {
        let radius_sq = self.radius * self.radius;
        match self
            .tree
            .within(&[x, y], radius_sq, &squared_euclidean)
        {
            Ok(hits) => hits
                .into_iter()
                .map(|(dist_sq, data)| {
                    let dist = match self.metric {
                        DistanceMetric::Euclidean => dist_sq.sqrt(),
                        DistanceMetric::SquaredEuclidean => dist_sq,
                    };
                    (data.clone(), dist)
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// The `k` nearest indexed points to `(x, y)`, regardless of `radius`.
    /// Used when a fixed-radius search returns too few neighbours.
    pub fn knn_search(&self, x: f64, y: f64, k: usize) -> Vec<(T, f64)> {
        if k == 0 {
            return Vec::new();
        }
        match self.tree.nearest(&[x, y], k, &squared_euclidean) {
            Ok(hits) => hits
                .into_iter()
                .map(|(dist_sq, data)| {
                    let dist = match self.metric {
                        DistanceMetric::Euclidean => dist_sq.sqrt(),
                        DistanceMetric::SquaredEuclidean => dist_sq,
                    };
                    (data.clone(), dist)
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_finds_points_within_radius() {
        let mut frs = FixedRadiusSearch2D::new(1.5, DistanceMetric::Euclidean);
        frs.insert(0.0, 0.0, 1u32);
        frs.insert(5.0, 5.0, 2u32);
        let hits = frs.search(0.0, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 1u32);
    }

    #[test]
    fn knn_ignores_radius() {
        let mut frs = FixedRadiusSearch2D::new(0.01, DistanceMetric::Euclidean);
        frs.insert(0.0, 0.0, 1u32);
        frs.insert(10.0, 10.0, 2u32);
        let hits = frs.knn_search(0.0, 0.0, 2);
        assert_eq!(hits.len(), 2);
    }
}
