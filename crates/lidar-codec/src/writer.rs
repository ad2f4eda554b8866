use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use lidar_common::{Bounds3D, CoreError};

use crate::header::point_record_length_for_format;
use crate::point_cloud::PointCloud;
use crate::point_format::write_point;
use crate::raw::{self, WriteHeaderArgs};

/// Writes `cloud` to `path` as an uncompressed LAS file in `point_format`.
/// Offsets are reset to the component-wise minimum of the cloud's bounds so
/// the quantized coordinates fit in a signed 32-bit integer (§4.1); the
/// scale is inherited from the source header when present, else defaults to
/// millimetre precision.
///
/// `compressed` requests LAZ output, which this codec does not implement
/// directly; it delegates to an external LAZ codec collaborator, and fails
/// with `CODEC_UNAVAILABLE` when none is wired in (there is none here).
pub fn write_point_cloud(
    cloud: &PointCloud,
    path: &Path,
    point_format: u8,
    compressed: bool,
) -> Result<(), CoreError> {
    if compressed {
        return Err(CoreError::CodecUnavailable);
    }
    let record_length = point_record_length_for_format(point_format)
        .ok_or(CoreError::UnsupportedPointFormat(point_format))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::WriteFailed(e.to_string()))?;
        }
    }

    let bounds = cloud
        .planar_bounds()
        .map(|b| Bounds3D::new((b.min_x, b.min_y, 0.0), (b.max_x, b.max_y, 0.0)))
        .unwrap_or_else(|| Bounds3D::new((0.0, 0.0, 0.0), (0.0, 0.0, 0.0)));
    let (min_z, max_z) = cloud.z.iter().fold((f64::MAX, f64::MIN), |(mn, mx), &z| {
        (mn.min(z), mx.max(z))
    });
    let bounds = if cloud.z.is_empty() {
        bounds
    } else {
        Bounds3D::new((bounds.min_x, bounds.min_y, min_z), (bounds.max_x, bounds.max_y, max_z))
    };

    let scale = cloud.header.as_ref().map(|h| h.scale).unwrap_or((0.001, 0.001, 0.001));
    let offset = (bounds.min_x, bounds.min_y, bounds.min_z);

    let (version_major, version_minor) = if point_format >= 6 { (1, 4) } else { (1, 2) };

    let file = File::create(path).map_err(|e| CoreError::WriteFailed(e.to_string()))?;
    let mut writer = BufWriter::new(file);

    raw::write_header(
        &mut writer,
        &WriteHeaderArgs {
            version_major,
            version_minor,
            point_format,
            point_record_length: record_length,
            scale,
            offset,
            bounds,
            point_count: cloud.point_count() as u64,
            crs: cloud.header.as_ref().and_then(|h| h.crs.as_deref()),
        },
    )?;

    for i in 0..cloud.point_count() {
        let intensity = cloud.intensity.as_ref().map(|v| v[i]).unwrap_or(0);
        let classification = cloud.classification.as_ref().map(|v| v[i]).unwrap_or(0);
        let return_number = cloud.return_number.as_ref().map(|v| v[i]).unwrap_or(1);
        let number_of_returns = cloud.number_of_returns.as_ref().map(|v| v[i]).unwrap_or(1);
        write_point(
            &mut writer,
            point_format,
            scale,
            offset,
            cloud.x[i],
            cloud.y[i],
            cloud.z[i],
            intensity,
            classification,
            return_number,
            number_of_returns,
        )?;
    }

    Ok(())
}
