//! Forest-analytics algorithms over airborne LiDAR point clouds: file
//! validation, metadata extraction, progressive-morphological-filter ground
//! classification, IDW/TIN gridding, DEM/DSM/CHM height normalization, and
//! watershed-based individual tree detection.

mod delaunay;
pub mod extractor;
pub mod ground_classifier;
pub mod height_normalizer;
pub mod interpolate;
mod raster_ops;
pub mod tree_detector;
pub mod validator;

pub use extractor::{extract_metadata, ClassificationBucket, ExtractorOptions, LidarMetadata, ReturnBucket};
pub use ground_classifier::{classify_ground, GroundMask, PmfParams};
pub use height_normalizer::{normalize_height, HeightNormalizerResult, InterpolationMethod, NormalizerParams};
pub use interpolate::{interpolate_idw, interpolate_tin, GridSpec, IdwParams};
pub use tree_detector::{detect_trees, CrownMetrics, Tree, TreeDetectorParams};
pub use validator::{quick_check, validate, Issue, Severity, ValidationResult, ValidationStatus, ValidatorConfig};
