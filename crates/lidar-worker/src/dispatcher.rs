//! Exhaustive dispatch from a decoded [`JobType`] to the `lidar-forestry`
//! algorithms, with result persistence to `output_path`/`output_dir`.
//!
//! No GeoTIFF or shapefile encoder exists anywhere in this workspace, so
//! raster and vector outputs are serialized as JSON next to the requested
//! output path. This is a deliberate simplification, documented in
//! DESIGN.md, not a literal implementation of the GeoTIFF/GeoJSON artifact
//! formats described in the reference system.

use std::path::{Path, PathBuf};

use lidar_codec::{read_point_cloud, ColumnSelect};
use lidar_common::{CoreError, CoreResult};
use lidar_forestry::{
    classify_ground, detect_trees, extract_metadata, normalize_height, quick_check, validate,
    ExtractorOptions, GroundMask, IdwParams, InterpolationMethod, NormalizerParams, PmfParams,
    TreeDetectorParams,
};
use serde_json::json;

use crate::job::{InterpolationMethodWire, JobType};
use crate::settings::Settings;

fn write_json(path: &Path, value: &serde_json::Value) -> CoreResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CoreError::WriteFailed(format!("failed to serialize output: {}", e)))?;
    std::fs::write(path, text).map_err(|e| CoreError::WriteFailed(e.to_string()))
}

fn pmf_params(wire: &crate::job::PmfJobParams) -> PmfParams {
    PmfParams {
        cell_size: wire.c,
        slope: wire.s,
        max_window_size: wire.w_max,
        initial_distance: wire.d0,
        max_distance: wire.d_max,
    }
}

fn normalizer_params(wire: &crate::job::NormalizeJobParams) -> NormalizerParams {
    NormalizerParams {
        cell_size: wire.c,
        method: match wire.method {
            InterpolationMethodWire::Idw => InterpolationMethod::Idw,
            InterpolationMethodWire::Tin => InterpolationMethod::Tin,
        },
        idw: IdwParams {
            power: wire.p,
            search_radius: wire.r,
            ..IdwParams::default()
        },
        dsm_first_returns_only: true,
    }
}

fn tree_detector_params(wire: &crate::job::DetectTreesJobParams) -> TreeDetectorParams {
    // spec.md §4.7 step 3: peak window side is ceil(2*d_min+1); radius is
    // half that, rounded down, since side = 2*radius+1.
    let window_side = (2.0 * wire.d_min + 1.0).ceil().max(1.0) as usize;
    let peak_window_radius = (window_side.saturating_sub(1) / 2).max(1);
    TreeDetectorParams {
        min_height: wire.h_min,
        smoothing_sigma: wire.sigma,
        peak_window_radius,
        use_markers: wire.use_markers,
        ..TreeDetectorParams::default()
    }
}

fn load_cloud(file_path: &str, select: ColumnSelect) -> CoreResult<lidar_codec::PointCloud> {
    read_point_cloud(Path::new(file_path), select)
}

fn ground_classify(
    file_path: &str,
    output_path: &Option<String>,
    wire_params: &crate::job::PmfJobParams,
) -> CoreResult<serde_json::Value> {
    let cloud = load_cloud(file_path, ColumnSelect::geometry_only())?;
    let params = pmf_params(wire_params);
    let mask: GroundMask = classify_ground(&cloud, &params)?;
    let ground_count = mask.iter().filter(|&&g| g).count();

    let payload = json!({
        "point_count": cloud.point_count(),
        "ground_point_count": ground_count,
        "ground_mask": mask,
    });
    if let Some(output_path) = output_path {
        write_json(Path::new(output_path), &payload)?;
    }
    Ok(payload)
}

fn normalize_height_job(
    file_path: &str,
    output_path: &Option<String>,
    wire_params: &crate::job::NormalizeJobParams,
) -> CoreResult<serde_json::Value> {
    let cloud = load_cloud(file_path, ColumnSelect::all())?;
    let ground_params = PmfParams::default();
    let mask = classify_ground(&cloud, &ground_params)?;
    let params = normalizer_params(wire_params);
    let result = normalize_height(&cloud, &mask, &params)?;

    let payload = json!({
        "dem": result.dem,
        "dsm": result.dsm,
        "chm": result.chm,
    });
    if let Some(output_path) = output_path {
        write_json(Path::new(output_path), &payload)?;
    }
    Ok(payload)
}

fn detect_trees_job(
    file_path: &str,
    output_path: &str,
    wire_params: &crate::job::DetectTreesJobParams,
) -> CoreResult<serde_json::Value> {
    let cloud = load_cloud(file_path, ColumnSelect::all())?;
    let ground_params = PmfParams::default();
    let mask = classify_ground(&cloud, &ground_params)?;
    let norm_result = normalize_height(&cloud, &mask, &NormalizerParams::default())?;
    let params = tree_detector_params(wire_params);
    let trees = detect_trees(&norm_result.chm, &params);

    let payload = json!({ "trees": trees });
    write_json(Path::new(output_path), &payload)?;
    Ok(payload)
}

fn full_pipeline(
    file_path: &str,
    output_path: &Option<String>,
    pmf: &crate::job::PmfJobParams,
    normalize: &crate::job::NormalizeJobParams,
    detect: &crate::job::DetectTreesJobParams,
    settings: &Settings,
) -> CoreResult<serde_json::Value> {
    let validation = validate(Path::new(file_path), &settings.validator_config(), false, false);
    if !validation.is_valid {
        return Err(CoreError::ReadFailed(format!(
            "pre-flight validation failed: {:?}",
            validation.issues
        )));
    }

    let cloud = load_cloud(file_path, ColumnSelect::all())?;
    let ground_params = pmf_params(pmf);
    let mask = classify_ground(&cloud, &ground_params)?;
    let norm_params = normalizer_params(normalize);
    let norm_result = normalize_height(&cloud, &mask, &norm_params)?;
    let detect_params = tree_detector_params(detect);
    let trees = detect_trees(&norm_result.chm, &detect_params);

    let payload = json!({
        "ground_point_count": mask.iter().filter(|&&g| g).count(),
        "dem": norm_result.dem,
        "chm": norm_result.chm,
        "trees": trees,
    });
    if let Some(base) = output_path {
        let base = PathBuf::from(base);
        write_json(&base, &payload)?;
    }
    Ok(payload)
}

/// Runs `job_type` to completion and returns its JSON payload. Never
/// panics: every failure mode surfaces as a `CoreError`, which the worker
/// loop turns into a failed `JobResult`.
pub fn dispatch(job_type: &JobType, settings: &Settings) -> CoreResult<serde_json::Value> {
    match job_type {
        JobType::Validate {
            file_path,
            require_crs,
            check_point_density,
        } => {
            let result = validate(
                Path::new(file_path),
                &settings.validator_config(),
                *require_crs,
                *check_point_density,
            );
            Ok(serde_json::to_value(result).expect("ValidationResult always serializes"))
        }
        JobType::ExtractMetadata {
            file_path,
            include_classification_counts,
            include_return_statistics,
            calculate_density,
            ..
        } => {
            let options = ExtractorOptions {
                include_classification_counts: *include_classification_counts,
                include_return_statistics: *include_return_statistics,
                calculate_density: *calculate_density,
                ..ExtractorOptions::default()
            };
            let metadata = extract_metadata(Path::new(file_path), &options)?;
            Ok(serde_json::to_value(metadata).expect("LidarMetadata always serializes"))
        }
        JobType::ValidateAndExtract {
            file_path,
            require_crs,
            check_point_density,
        } => {
            let validation = validate(
                Path::new(file_path),
                &settings.validator_config(),
                *require_crs,
                *check_point_density,
            );
            if !validation.is_valid {
                return Ok(json!({ "validation": validation, "metadata": null }));
            }
            let metadata = extract_metadata(Path::new(file_path), &ExtractorOptions::default())?;
            Ok(json!({ "validation": validation, "metadata": metadata }))
        }
        JobType::GroundClassify {
            file_path,
            output_path,
            params,
        } => ground_classify(file_path, output_path, params),
        JobType::NormalizeHeight {
            file_path,
            output_path,
            params,
        } => normalize_height_job(file_path, output_path, params),
        JobType::DetectTrees {
            file_path,
            output_path,
            params,
        } => detect_trees_job(file_path, output_path, params),
        JobType::FullPipeline {
            file_path,
            output_path,
            pmf_params,
            normalize_params,
            detect_params,
        } => full_pipeline(
            file_path,
            output_path,
            pmf_params,
            normalize_params,
            detect_params,
            settings,
        ),
    }
}

/// Cheap pre-admission check used by the worker before it commits to
/// loading a potentially large file into memory.
pub fn quick_admit(file_path: &str, settings: &Settings) -> bool {
    quick_check(Path::new(file_path), &settings.validator_config(), settings.require_crs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lidar_codec::{write_point_cloud, LasHeader};
    use lidar_common::Bounds3D;
    use tempfile::tempdir;

    fn sample_las(path: &Path) {
        let n = 30;
        let header = LasHeader {
            version_major: 1,
            version_minor: 2,
            point_format: 1,
            point_record_length: 28,
            scale: (0.001, 0.001, 0.001),
            offset: (0.0, 0.0, 0.0),
            bounds: Bounds3D::new((0.0, 0.0, 0.0), (30.0, 30.0, 10.0)),
            point_count: n as u64 * n as u64,
            crs: Some("EPSG:32610".to_string()),
        };
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut z = Vec::new();
        for i in 0..n {
            for j in 0..n {
                x.push(i as f64);
                y.push(j as f64);
                z.push(5.0);
            }
        }
        let cloud = lidar_codec::PointCloud {
            header: Some(header),
            x,
            y,
            z,
            intensity: None,
            classification: Some(vec![2; n * n]),
            return_number: Some(vec![1; n * n]),
            number_of_returns: Some(vec![1; n * n]),
        };
        write_point_cloud(&cloud, path, 1, false).unwrap();
    }

    #[test]
    fn validate_job_dispatches() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.las");
        sample_las(&path);
        let settings = Settings::default();
        let job_type = JobType::Validate {
            file_path: path.to_string_lossy().to_string(),
            require_crs: false,
            check_point_density: false,
        };
        let payload = dispatch(&job_type, &settings).unwrap();
        assert_eq!(payload["is_valid"], json!(true));
    }

    #[test]
    fn ground_classify_job_dispatches_and_writes_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.las");
        sample_las(&path);
        let out = dir.path().join("ground.json");
        let settings = Settings::default();
        let job_type = JobType::GroundClassify {
            file_path: path.to_string_lossy().to_string(),
            output_path: Some(out.to_string_lossy().to_string()),
            params: crate::job::PmfJobParams::default(),
        };
        let payload = dispatch(&job_type, &settings).unwrap();
        assert!(payload["ground_point_count"].as_u64().unwrap() > 0);
        assert!(out.exists());
    }

    #[test]
    fn unsupported_file_surfaces_as_core_error() {
        let settings = Settings::default();
        let job_type = JobType::ExtractMetadata {
            file_path: "/no/such/file.las".to_string(),
            include_classification_counts: true,
            include_return_statistics: true,
            calculate_density: true,
            sample_size: None,
        };
        let err = dispatch(&job_type, &settings).unwrap_err();
        assert_eq!(err.code(), "FILE_NOT_FOUND");
    }
}
