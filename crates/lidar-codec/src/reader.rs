use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use lidar_common::CoreError;

use crate::header::LasHeader;
use crate::point_cloud::{ColumnSelect, PointCloud};
use crate::point_format::read_point;
use crate::raw;

fn open(path: &Path) -> Result<BufReader<File>, CoreError> {
    let file = File::open(path).map_err(|_| CoreError::FileNotFound(path.display().to_string()))?;
    Ok(BufReader::new(file))
}

/// Reads just the public header block (plus CRS VLR), without touching any
/// point records.
pub fn read_header(path: &Path) -> Result<LasHeader, CoreError> {
    let mut reader = open(path)?;
    Ok(raw::read_header(&mut reader)?.header)
}

/// Reads the full point cloud, materializing the columns named in `select`.
pub fn read_point_cloud(path: &Path, select: ColumnSelect) -> Result<PointCloud, CoreError> {
    let mut reader = open(path)?;
    let parsed = raw::read_header(&mut reader)?;
    reader
        .seek(SeekFrom::Start(parsed.point_data_offset as u64))
        .map_err(|e| CoreError::ReadFailed(e.to_string()))?;

    let n = parsed.header.point_count as usize;
    let mut cloud = PointCloud {
        header: Some(parsed.header.clone()),
        x: Vec::with_capacity(n),
        y: Vec::with_capacity(n),
        z: Vec::with_capacity(n),
        intensity: select.intensity.then(|| Vec::with_capacity(n)),
        classification: select.classification.then(|| Vec::with_capacity(n)),
        return_number: select.return_number.then(|| Vec::with_capacity(n)),
        number_of_returns: select.number_of_returns.then(|| Vec::with_capacity(n)),
    };

    for _ in 0..n {
        let p = read_point(
            &mut reader,
            parsed.header.point_format,
            parsed.header.point_record_length,
            parsed.header.scale,
            parsed.header.offset,
        )?;
        cloud.x.push(p.x);
        cloud.y.push(p.y);
        cloud.z.push(p.z);
        if let Some(v) = cloud.intensity.as_mut() {
            v.push(p.intensity);
        }
        if let Some(v) = cloud.classification.as_mut() {
            v.push(p.classification);
        }
        if let Some(v) = cloud.return_number.as_mut() {
            v.push(p.return_number);
        }
        if let Some(v) = cloud.number_of_returns.as_mut() {
            v.push(p.number_of_returns);
        }
    }

    cloud.check_invariants()?;
    Ok(cloud)
}
