mod chunked;
mod header;
mod point_cloud;
mod point_format;
mod raw;
mod reader;
mod writer;

pub use chunked::{stream_chunks, ChunkReader};
pub use header::{
    has_colour, has_gps_time, is_extended, point_record_length_for_format, LasHeader,
    SUPPORTED_POINT_FORMATS,
};
pub use point_cloud::{ColumnSelect, PointCloud};
pub use reader::{read_header, read_point_cloud};
pub use writer::write_point_cloud;

#[cfg(test)]
mod tests {
    use super::*;
    use lidar_common::Bounds3D;
    use tempfile::tempdir;

    fn sample_cloud(point_format: u8) -> PointCloud {
        let header = LasHeader {
            version_major: 1,
            version_minor: if point_format >= 6 { 4 } else { 2 },
            point_format,
            point_record_length: point_record_length_for_format(point_format).unwrap(),
            scale: (0.001, 0.001, 0.001),
            offset: (0.0, 0.0, 0.0),
            bounds: Bounds3D::new((0.0, 0.0, 0.0), (10.0, 10.0, 10.0)),
            point_count: 3,
            crs: Some("EPSG:32610".to_string()),
        };
        PointCloud {
            header: Some(header),
            x: vec![0.0, 5.123, 9.999],
            y: vec![0.0, 4.5, 9.0],
            z: vec![1.0, 2.5, 3.25],
            intensity: Some(vec![10, 20, 30]),
            classification: Some(vec![2, 5, 2]),
            return_number: Some(vec![1, 1, 2]),
            number_of_returns: Some(vec![1, 2, 2]),
        }
    }

    #[test]
    fn round_trips_point_format_3() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.las");
        let cloud = sample_cloud(3);
        write_point_cloud(&cloud, &path, 3, false).unwrap();

        let read_back = read_point_cloud(&path, ColumnSelect::all()).unwrap();
        assert_eq!(read_back.point_count(), cloud.point_count());
        for i in 0..cloud.point_count() {
            assert!((read_back.x[i] - cloud.x[i]).abs() <= 0.001);
            assert!((read_back.y[i] - cloud.y[i]).abs() <= 0.001);
            assert!((read_back.z[i] - cloud.z[i]).abs() <= 0.001);
        }
        assert_eq!(
            read_back.classification.unwrap(),
            cloud.classification.unwrap()
        );
        assert_eq!(
            read_back.return_number.unwrap(),
            cloud.return_number.unwrap()
        );
        assert_eq!(
            read_back.number_of_returns.unwrap(),
            cloud.number_of_returns.unwrap()
        );
        assert_eq!(
            read_back.header.as_ref().unwrap().crs.as_deref(),
            Some("EPSG:32610")
        );
    }

    #[test]
    fn round_trips_extended_point_format_7() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test14.las");
        let cloud = sample_cloud(7);
        write_point_cloud(&cloud, &path, 7, false).unwrap();

        let read_back = read_point_cloud(&path, ColumnSelect::all()).unwrap();
        assert_eq!(read_back.point_count(), 3);
        assert_eq!(read_back.header.as_ref().unwrap().version_minor, 4);
    }

    #[test]
    fn compressed_write_without_codec_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.laz");
        let cloud = sample_cloud(0);
        let err = write_point_cloud(&cloud, &path, 0, true).unwrap_err();
        assert_eq!(err.code(), "CODEC_UNAVAILABLE");
    }

    #[test]
    fn reading_a_laz_flagged_file_fails_without_a_codec() {
        use std::io::{Read, Seek, SeekFrom, Write};

        let dir = tempdir().unwrap();
        let path = dir.path().join("test.las");
        let cloud = sample_cloud(0);
        write_point_cloud(&cloud, &path, 0, false).unwrap();

        // Flip the LAZ-compression high bit on the on-disk point format byte
        // (offset 104 in the public header block) without touching anything
        // else, simulating a LAZ file arriving at a build with no codec.
        let mut file = std::fs::OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(104)).unwrap();
        let mut byte = [0u8; 1];
        file.read_exact(&mut byte).unwrap();
        file.seek(SeekFrom::Start(104)).unwrap();
        file.write_all(&[byte[0] | 0x80]).unwrap();
        drop(file);

        let err = read_point_cloud(&path, ColumnSelect::all()).unwrap_err();
        assert_eq!(err.code(), "CODEC_UNAVAILABLE");
    }

    #[test]
    fn read_header_only_matches_full_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.las");
        let cloud = sample_cloud(1);
        write_point_cloud(&cloud, &path, 1, false).unwrap();

        let header = read_header(&path).unwrap();
        assert_eq!(header.point_count, 3);
        assert_eq!(header.point_format, 1);
    }
}
