mod bounding_box;
mod point;
mod raster;
mod spatial_search;

pub use bounding_box::{Bounds2D, Bounds3D};
pub use point::{Point2D, Point3D};
pub use raster::{fill_nearest_neighbour, Raster};
pub use spatial_search::{DistanceMetric, FixedRadiusSearch2D};
