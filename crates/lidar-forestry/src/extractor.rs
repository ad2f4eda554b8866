use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use lidar_codec::{stream_chunks, ColumnSelect, LasHeader};
use lidar_common::{Bounds3D, CoreResult};
use serde::{Deserialize, Serialize};

/// Standard ASPRS classification names for codes 0-18; 19-63 are reserved
/// and 64-255 are available for user-defined classes.
pub fn classification_name(code: u8) -> String {
    match code {
        0 => "Created, never classified",
        1 => "Unclassified",
        2 => "Ground",
        3 => "Low Vegetation",
        4 => "Medium Vegetation",
        5 => "High Vegetation",
        6 => "Building",
        7 => "Low Point (noise)",
        8 => "Reserved",
        9 => "Water",
        10 => "Rail",
        11 => "Road Surface",
        12 => "Reserved",
        13 => "Wire - Guard (Shield)",
        14 => "Wire - Conductor (Phase)",
        15 => "Transmission Tower",
        16 => "Wire-structure Connector",
        17 => "Bridge Deck",
        18 => "High Noise",
        19..=63 => "Reserved",
        _ => "User Defined",
    }
    .to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassificationBucket {
    pub name: String,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReturnBucket {
    pub count: u64,
    pub percentage: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LidarMetadata {
    pub file_path: String,
    pub version: String,
    pub point_format: u8,
    pub point_count: u64,
    pub bounds: Bounds3D,
    pub scale: (f64, f64, f64),
    pub offset: (f64, f64, f64),
    pub crs: Option<String>,
    /// `points / (width * height)`, `None` when the planar bounds have zero area.
    pub point_density: Option<f64>,
    pub classification_histogram: Option<BTreeMap<u8, ClassificationBucket>>,
    pub return_number_histogram: Option<BTreeMap<u8, ReturnBucket>>,
    pub extraction_time_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ExtractorOptions {
    pub chunk_size: usize,
    pub include_classification_counts: bool,
    pub include_return_statistics: bool,
    pub calculate_density: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        ExtractorOptions {
            chunk_size: 1_000_000,
            include_classification_counts: true,
            include_return_statistics: true,
            calculate_density: true,
        }
    }
}

/// Streams the file in chunks, tallying the histograms requested in
/// `options` without ever materializing more than one chunk at a time.
pub fn extract_metadata(path: &Path, options: &ExtractorOptions) -> CoreResult<LidarMetadata> {
    let start = Instant::now();

    let select = ColumnSelect {
        intensity: false,
        classification: options.include_classification_counts,
        return_number: options.include_return_statistics,
        number_of_returns: false,
    };
    let chunks = stream_chunks(path, options.chunk_size, select)?;
    let header: LasHeader = chunks.header().clone();

    let mut class_counts: BTreeMap<u8, u64> = BTreeMap::new();
    let mut return_counts: BTreeMap<u8, u64> = BTreeMap::new();
    let mut total: u64 = 0;

    for chunk in chunks {
        let chunk = chunk?;
        total += chunk.point_count() as u64;
        if let Some(classes) = chunk.classification.as_ref() {
            for &c in classes {
                *class_counts.entry(c).or_insert(0) += 1;
            }
        }
        if let Some(returns) = chunk.return_number.as_ref() {
            for &r in returns {
                *return_counts.entry(r).or_insert(0) += 1;
            }
        }
    }

    let bounds = header.bounds;
    let point_density = if options.calculate_density {
        let planar = bounds.planar();
        if planar.area() > 0.0 {
            Some(total as f64 / planar.area())
        } else {
            None
        }
    } else {
        None
    };

    let classification_histogram = options.include_classification_counts.then(|| {
        class_counts
            .into_iter()
            .map(|(code, count)| {
                (
                    code,
                    ClassificationBucket {
                        name: classification_name(code),
                        count,
                    },
                )
            })
            .collect()
    });

    let return_number_histogram = options.include_return_statistics.then(|| {
        return_counts
            .into_iter()
            .map(|(ret, count)| {
                let percentage = if total > 0 {
                    100.0 * count as f64 / total as f64
                } else {
                    0.0
                };
                (ret, ReturnBucket { count, percentage })
            })
            .collect()
    });

    Ok(LidarMetadata {
        file_path: path.display().to_string(),
        version: header.version_string(),
        point_format: header.point_format,
        point_count: total,
        bounds,
        scale: header.scale,
        offset: header.offset,
        crs: header.crs,
        point_density,
        classification_histogram,
        return_number_histogram,
        extraction_time_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_standard_and_reserved_ranges() {
        assert_eq!(classification_name(2), "Ground");
        assert_eq!(classification_name(30), "Reserved");
        assert_eq!(classification_name(200), "User Defined");
    }
}
