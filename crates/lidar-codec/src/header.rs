use lidar_common::Bounds3D;

/// The decoded subset of the LAS public header block this pipeline cares
/// about: enough to locate point records, undo their quantization, and carry
/// the CRS through unmodified.
#[derive(Clone, Debug, PartialEq)]
pub struct LasHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub point_format: u8,
    pub point_record_length: u16,
    pub scale: (f64, f64, f64),
    pub offset: (f64, f64, f64),
    pub bounds: Bounds3D,
    pub point_count: u64,
    /// WKT string carried in VLR record-id 2112, if present.
    pub crs: Option<String>,
}

impl LasHeader {
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.version_major, self.version_minor)
    }

    pub fn is_supported_version(&self, supported: &[&str]) -> bool {
        supported.contains(&self.version_string().as_str())
    }
}

/// Point formats handled by this codec. LAZ compression is orthogonal to the
/// format id and is signalled separately (point format | 0x80 on disk, per
/// the LASzip convention), not modeled here.
pub const SUPPORTED_POINT_FORMATS: [u8; 7] = [0, 1, 2, 3, 6, 7, 8];

pub fn point_record_length_for_format(format: u8) -> Option<u16> {
    match format {
        0 => Some(20),
        1 => Some(28),
        2 => Some(26),
        3 => Some(34),
        6 => Some(30),
        7 => Some(36),
        8 => Some(38),
        _ => None,
    }
}

pub fn has_gps_time(format: u8) -> bool {
    matches!(format, 1 | 3 | 4 | 5 | 6 | 7 | 8 | 9 | 10)
}

pub fn has_colour(format: u8) -> bool {
    matches!(format, 2 | 3 | 5 | 7 | 8 | 10)
}

pub fn is_extended(format: u8) -> bool {
    format >= 6
}
