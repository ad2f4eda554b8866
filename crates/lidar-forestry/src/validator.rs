use std::path::Path;

use lidar_codec::{read_header, SUPPORTED_POINT_FORMATS};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Valid,
    Invalid,
    Warning,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Issue {
    pub code: String,
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    fn new(code: &str, severity: Severity, message: impl Into<String>) -> Issue {
        Issue {
            code: code.to_string(),
            severity,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub issues: Vec<Issue>,
    pub is_valid: bool,
}

/// Caller-supplied thresholds for the cheap pre-flight check. Passed
/// explicitly rather than read from a global so the validator stays a pure
/// function of its inputs (§9: no process-wide singletons beyond a logger).
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    pub max_file_size_mb: u64,
    pub min_point_count: u64,
    pub supported_versions: Vec<String>,
    pub supported_point_formats: Vec<u8>,
    pub allowed_extensions: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            max_file_size_mb: 2048,
            min_point_count: 100,
            supported_versions: vec!["1.2".into(), "1.3".into(), "1.4".into()],
            supported_point_formats: SUPPORTED_POINT_FORMATS.to_vec(),
            allowed_extensions: vec![".las".into(), ".laz".into()],
        }
    }
}

/// Runs every pre-flight check and returns a populated `ValidationResult`.
/// Never fails with an exception: a missing or malformed file simply
/// produces an `Invalid` status with the relevant issue codes (§7).
pub fn validate(
    path: &Path,
    config: &ValidatorConfig,
    require_crs: bool,
    check_point_density: bool,
) -> ValidationResult {
    let mut issues = Vec::new();

    let extension_ok = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .map(|ext| config.allowed_extensions.iter().any(|a| a == &ext))
        .unwrap_or(false);
    if !extension_ok {
        issues.push(Issue::new(
            "INVALID_EXTENSION",
            Severity::Error,
            format!("file extension is not one of {:?}", config.allowed_extensions),
        ));
    }

    if !path.exists() {
        issues.push(Issue::new(
            "FILE_NOT_FOUND",
            Severity::Error,
            format!("no such file: {}", path.display()),
        ));
        return finalize(issues);
    }

    if let Ok(metadata) = std::fs::metadata(path) {
        let size_mb = metadata.len() / (1024 * 1024);
        if size_mb > config.max_file_size_mb {
            issues.push(Issue::new(
                "FILE_TOO_LARGE",
                Severity::Error,
                format!(
                    "file is {} MB, exceeding the configured maximum of {} MB",
                    size_mb, config.max_file_size_mb
                ),
            ));
        }
    }

    // A header we can't even parse still produces a useful issue rather
    // than propagating an exception.
    let header = match read_header(path) {
        Ok(h) => h,
        Err(e) => {
            issues.push(Issue::new(
                "FILE_NOT_FOUND",
                Severity::Error,
                format!("unable to read header: {}", e),
            ));
            return finalize(issues);
        }
    };

    let version = header.version_string();
    if !config.supported_versions.iter().any(|v| v == &version) {
        issues.push(Issue::new(
            "UNSUPPORTED_VERSION",
            Severity::Error,
            format!("LAS version {} is not supported", version),
        ));
    }

    if !config
        .supported_point_formats
        .contains(&header.point_format)
    {
        issues.push(Issue::new(
            "UNSUPPORTED_POINT_FORMAT",
            Severity::Error,
            format!("point format {} is not supported", header.point_format),
        ));
    }

    if header.point_count < config.min_point_count {
        issues.push(Issue::new(
            "INSUFFICIENT_POINTS",
            Severity::Error,
            format!(
                "point count {} is below the configured minimum of {}",
                header.point_count, config.min_point_count
            ),
        ));
    }

    if header.crs.is_none() {
        let severity = if require_crs {
            Severity::Error
        } else {
            Severity::Warning
        };
        issues.push(Issue::new(
            "MISSING_CRS",
            severity,
            "no CRS WKT VLR (record id 2112) found",
        ));
    }

    if let Some(axis) = header.bounds.is_inverted_axis() {
        issues.push(Issue::new(
            "INVERTED_BOUNDS",
            Severity::Error,
            format!("min > max on the {} axis", axis),
        ));
    }

    let (sx, sy, sz) = header.scale;
    if sx <= 0.0 || sy <= 0.0 || sz <= 0.0 {
        issues.push(Issue::new(
            "ZERO_SCALE",
            Severity::Error,
            "one or more scale components is zero or negative",
        ));
    }

    if check_point_density {
        let bounds = header.bounds.planar();
        if bounds.area() > 0.0 {
            let density = header.point_count as f64 / bounds.area();
            if density < 0.01 {
                issues.push(Issue::new(
                    "INSUFFICIENT_POINTS",
                    Severity::Warning,
                    format!("point density is low: {:.4} points/m^2", density),
                ));
            }
        }
    }

    finalize(issues)
}

fn finalize(issues: Vec<Issue>) -> ValidationResult {
    let has_error = issues.iter().any(|i| i.severity == Severity::Error);
    let has_warning = issues.iter().any(|i| i.severity == Severity::Warning);
    let status = if has_error {
        ValidationStatus::Invalid
    } else if has_warning {
        ValidationStatus::Warning
    } else {
        ValidationStatus::Valid
    };
    ValidationResult {
        status,
        is_valid: !has_error,
        issues,
    }
}

/// Returns only whether the file is valid, aborting at the first
/// error-class issue rather than collecting every check.
pub fn quick_check(path: &Path, config: &ValidatorConfig, require_crs: bool) -> bool {
    if !path.exists() {
        return false;
    }
    let extension_ok = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .map(|ext| config.allowed_extensions.iter().any(|a| a == &ext))
        .unwrap_or(false);
    if !extension_ok {
        return false;
    }
    let header = match read_header(path) {
        Ok(h) => h,
        Err(_) => return false,
    };
    if !config.supported_versions.iter().any(|v| v == &header.version_string()) {
        return false;
    }
    if !config.supported_point_formats.contains(&header.point_format) {
        return false;
    }
    if header.point_count < config.min_point_count {
        return false;
    }
    if require_crs && header.crs.is_none() {
        return false;
    }
    if header.bounds.is_inverted_axis().is_some() {
        return false;
    }
    let (sx, sy, sz) = header.scale;
    if sx <= 0.0 || sy <= 0.0 || sz <= 0.0 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use lidar_codec::{write_point_cloud, LasHeader, PointCloud};
    use lidar_common::Bounds3D;
    use tempfile::tempdir;

    fn valid_cloud() -> PointCloud {
        let header = LasHeader {
            version_major: 1,
            version_minor: 2,
            point_format: 1,
            point_record_length: 28,
            scale: (0.001, 0.001, 0.001),
            offset: (0.0, 0.0, 0.0),
            bounds: Bounds3D::new((0.0, 0.0, 0.0), (10.0, 10.0, 10.0)),
            point_count: 200,
            crs: Some("EPSG:32610".to_string()),
        };
        let n = 200;
        PointCloud {
            header: Some(header),
            x: (0..n).map(|i| i as f64 * 0.05).collect(),
            y: (0..n).map(|i| i as f64 * 0.05).collect(),
            z: vec![1.0; n],
            intensity: None,
            classification: Some(vec![1; n]),
            return_number: Some(vec![1; n]),
            number_of_returns: Some(vec![1; n]),
        }
    }

    #[test]
    fn missing_file_is_invalid() {
        let config = ValidatorConfig::default();
        let result = validate(Path::new("/no/such/file.las"), &config, false, false);
        assert_eq!(result.status, ValidationStatus::Invalid);
        assert!(!result.is_valid);
        assert_eq!(result.issues[0].code, "FILE_NOT_FOUND");
    }

    #[test]
    fn wrong_extension_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"not a las file").unwrap();
        let config = ValidatorConfig::default();
        let result = validate(&path, &config, false, false);
        assert!(!result.is_valid);
        assert!(result.issues.iter().any(|i| i.code == "INVALID_EXTENSION"));
    }

    #[test]
    fn valid_file_is_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.las");
        write_point_cloud(&valid_cloud(), &path, 1, false).unwrap();
        let config = ValidatorConfig::default();
        let result = validate(&path, &config, true, false);
        assert_eq!(result.status, ValidationStatus::Valid);
        assert!(result.is_valid);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn validate_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.las");
        write_point_cloud(&valid_cloud(), &path, 1, false).unwrap();
        let config = ValidatorConfig::default();
        let first = validate(&path, &config, true, false);
        let second = validate(&path, &config, true, false);
        let first_codes: Vec<_> = first.issues.iter().map(|i| i.code.clone()).collect();
        let second_codes: Vec<_> = second.issues.iter().map(|i| i.code.clone()).collect();
        assert_eq!(first_codes, second_codes);
    }
}
