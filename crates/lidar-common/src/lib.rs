pub mod error;
pub mod structures;

pub use error::{CoreError, CoreResult};
pub use structures::{
    fill_nearest_neighbour, Bounds2D, Bounds3D, DistanceMetric, FixedRadiusSearch2D, Point2D,
    Point3D, Raster,
};
