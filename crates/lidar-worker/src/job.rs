//! Job and JobResult wire types. Every job type carries its own typed
//! parameter record rather than an open key/value bag, so the dispatcher can
//! match exhaustively (§9: no dynamically-typed params).

use serde::{Deserialize, Serialize};

/// PMF parameters as carried on the wire, named after the symbols in the
/// ground classifier's algorithm description (`c` = cell size, `s` = slope,
/// `w_max` = max window size, `d0`/`d_max` = initial/max height threshold).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PmfJobParams {
    #[serde(default = "default_cell_size")]
    pub c: f64,
    #[serde(default = "default_slope")]
    pub s: f64,
    #[serde(default = "default_w_max")]
    pub w_max: f64,
    #[serde(default = "default_d0")]
    pub d0: f64,
    #[serde(default = "default_d_max")]
    pub d_max: f64,
}

impl Default for PmfJobParams {
    fn default() -> Self {
        PmfJobParams {
            c: default_cell_size(),
            s: default_slope(),
            w_max: default_w_max(),
            d0: default_d0(),
            d_max: default_d_max(),
        }
    }
}

fn default_cell_size() -> f64 {
    1.0
}
fn default_slope() -> f64 {
    0.15
}
fn default_w_max() -> f64 {
    33.0
}
fn default_d0() -> f64 {
    0.5
}
fn default_d_max() -> f64 {
    3.0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethodWire {
    Idw,
    Tin,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizeJobParams {
    #[serde(default = "default_cell_size")]
    pub c: f64,
    #[serde(default = "default_method")]
    pub method: InterpolationMethodWire,
    /// IDW power.
    #[serde(default = "default_power")]
    pub p: f64,
    /// IDW search radius.
    #[serde(default = "default_radius")]
    pub r: f64,
}

impl Default for NormalizeJobParams {
    fn default() -> Self {
        NormalizeJobParams {
            c: default_cell_size(),
            method: default_method(),
            p: default_power(),
            r: default_radius(),
        }
    }
}

fn default_method() -> InterpolationMethodWire {
    InterpolationMethodWire::Tin
}
fn default_power() -> f64 {
    2.0
}
fn default_radius() -> f64 {
    2.5
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectTreesJobParams {
    #[serde(default = "default_h_min")]
    pub h_min: f64,
    /// Minimum tree separation in CHM cells; sets the peak-detection
    /// window radius when `use_markers` is true.
    #[serde(default = "default_d_min")]
    pub d_min: f64,
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// When false, skip marker detection/watershed and treat every
    /// connected component of the height mask as one crown directly.
    #[serde(default = "default_use_markers")]
    pub use_markers: bool,
}

impl Default for DetectTreesJobParams {
    fn default() -> Self {
        DetectTreesJobParams {
            h_min: default_h_min(),
            d_min: default_d_min(),
            sigma: default_sigma(),
            algorithm: default_algorithm(),
            use_markers: default_use_markers(),
        }
    }
}

fn default_h_min() -> f64 {
    2.0
}
fn default_d_min() -> f64 {
    3.0
}
fn default_sigma() -> f64 {
    1.0
}
fn default_algorithm() -> String {
    "watershed".to_string()
}
fn default_use_markers() -> bool {
    true
}

/// The closed set of job types the dispatcher handles. Legacy names from
/// the reference implementation (`validate_and_extract`) and the current
/// canonical names (`ground_classify`) are both accepted via `alias`; see
/// DESIGN.md for the resolved naming policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobType {
    Validate {
        file_path: String,
        #[serde(default)]
        require_crs: bool,
        #[serde(default)]
        check_point_density: bool,
    },
    ExtractMetadata {
        file_path: String,
        #[serde(default = "default_true")]
        include_classification_counts: bool,
        #[serde(default = "default_true")]
        include_return_statistics: bool,
        #[serde(default = "default_true")]
        calculate_density: bool,
        #[serde(default)]
        sample_size: Option<usize>,
    },
    ValidateAndExtract {
        file_path: String,
        #[serde(default)]
        require_crs: bool,
        #[serde(default)]
        check_point_density: bool,
    },
    #[serde(alias = "classify_ground")]
    GroundClassify {
        file_path: String,
        output_path: Option<String>,
        #[serde(default)]
        params: PmfJobParams,
    },
    NormalizeHeight {
        file_path: String,
        output_path: Option<String>,
        #[serde(default)]
        params: NormalizeJobParams,
    },
    DetectTrees {
        file_path: String,
        output_path: String,
        #[serde(default)]
        params: DetectTreesJobParams,
    },
    FullPipeline {
        file_path: String,
        output_path: Option<String>,
        #[serde(default)]
        pmf_params: PmfJobParams,
        #[serde(default)]
        normalize_params: NormalizeJobParams,
        #[serde(default)]
        detect_params: DetectTreesJobParams,
    },
}

fn default_true() -> bool {
    true
}

impl JobType {
    pub fn name(&self) -> &'static str {
        match self {
            JobType::Validate { .. } => "validate",
            JobType::ExtractMetadata { .. } => "extract_metadata",
            JobType::ValidateAndExtract { .. } => "validate_and_extract",
            JobType::GroundClassify { .. } => "ground_classify",
            JobType::NormalizeHeight { .. } => "normalize_height",
            JobType::DetectTrees { .. } => "detect_trees",
            JobType::FullPipeline { .. } => "full_pipeline",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(flatten)]
    pub job_type: JobType,
    pub callback_url: Option<String>,
    #[serde(default)]
    pub priority: i64,
    pub enqueued_at: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub job_type: String,
    pub payload: Option<serde_json::Value>,
    pub error: Option<JobError>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl JobResult {
    pub fn pending(job_id: &str, job_type: &str) -> JobResult {
        JobResult {
            job_id: job_id.to_string(),
            status: JobStatus::Pending,
            job_type: job_type.to_string(),
            payload: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_round_trips_snake_case_and_legacy_alias() {
        let json = serde_json::json!({
            "type": "classify_ground",
            "file_path": "a.las",
            "output_path": null,
            "params": {}
        });
        let job_type: JobType = serde_json::from_value(json).unwrap();
        assert_eq!(job_type.name(), "ground_classify");
    }

    #[test]
    fn full_job_round_trips_through_json() {
        let job = Job {
            id: "j1".to_string(),
            job_type: JobType::Validate {
                file_path: "a.las".to_string(),
                require_crs: true,
                check_point_density: false,
            },
            callback_url: None,
            priority: 0,
            enqueued_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let s = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&s).unwrap();
        assert_eq!(back.id, "j1");
        assert_eq!(back.job_type.name(), "validate");
    }
}
