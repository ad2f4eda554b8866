use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use lidar_common::CoreError;

use crate::header::LasHeader;
use crate::point_cloud::{ColumnSelect, PointCloud};
use crate::point_format::read_point;
use crate::raw;

/// A lazy, finite, single-pass sequence of `PointCloud` chunks. Never holds
/// more than `chunk_size` points in memory at once; used by the metadata
/// extractor so it can tally histograms over files larger than RAM.
pub struct ChunkReader {
    reader: BufReader<File>,
    header: LasHeader,
    select: ColumnSelect,
    chunk_size: usize,
    points_remaining: u64,
}

pub fn stream_chunks(
    path: &Path,
    chunk_size: usize,
    select: ColumnSelect,
) -> Result<ChunkReader, CoreError> {
    let file = File::open(path).map_err(|_| CoreError::FileNotFound(path.display().to_string()))?;
    let mut reader = BufReader::new(file);
    let parsed = raw::read_header(&mut reader)?;
    reader
        .seek(SeekFrom::Start(parsed.point_data_offset as u64))
        .map_err(|e| CoreError::ReadFailed(e.to_string()))?;

    Ok(ChunkReader {
        reader,
        points_remaining: parsed.header.point_count,
        header: parsed.header,
        select,
        chunk_size: chunk_size.max(1),
    })
}

impl ChunkReader {
    pub fn header(&self) -> &LasHeader {
        &self.header
    }
}

impl Iterator for ChunkReader {
    type Item = Result<PointCloud, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.points_remaining == 0 {
            return None;
        }
        let n = self.chunk_size.min(self.points_remaining as usize);
        let mut cloud = PointCloud {
            header: Some(self.header.clone()),
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            z: Vec::with_capacity(n),
            intensity: self.select.intensity.then(|| Vec::with_capacity(n)),
            classification: self.select.classification.then(|| Vec::with_capacity(n)),
            return_number: self.select.return_number.then(|| Vec::with_capacity(n)),
            number_of_returns: self
                .select
                .number_of_returns
                .then(|| Vec::with_capacity(n)),
        };

        for _ in 0..n {
            let p = match read_point(
                &mut self.reader,
                self.header.point_format,
                self.header.point_record_length,
                self.header.scale,
                self.header.offset,
            ) {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
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
        self.points_remaining -= n as u64;
        Some(Ok(cloud))
    }
}
