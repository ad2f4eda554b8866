use thiserror::Error;

/// Stable, user-facing error codes shared by the validator, the algorithms,
/// and the job dispatcher. These strings are part of the external contract
/// (they show up verbatim in `ValidationResult.issues[].code` and in
/// `JobResult.error.code`) and must not be renamed casually.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("unsupported file extension: {0}")]
    InvalidExtension(String),
    #[error("file exceeds the configured maximum size: {0} bytes")]
    FileTooLarge(u64),
    #[error("unsupported LAS version: {0}")]
    UnsupportedVersion(String),
    #[error("unsupported point record format: {0}")]
    UnsupportedPointFormat(u8),
    #[error("point count {0} is below the configured minimum")]
    InsufficientPoints(u64),
    #[error("point cloud has no coordinate reference system")]
    MissingCrs,
    #[error("bounds are inverted on the {0} axis")]
    InvertedBounds(&'static str),
    #[error("scale component is zero or negative on the {0} axis")]
    ZeroScale(&'static str),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("no usable points for this stage")]
    EmptyCloud,
    #[error("triangulation is degenerate (collinear samples); falling back to IDW")]
    DegenerateTriangulation,
    #[error("height normalization requested but no ground points are available")]
    NoGroundPoints,

    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("LAZ compression requested but no codec is available")]
    CodecUnavailable,

    #[error("job exceeded its timeout")]
    JobTimeout,
    #[error("unknown job type: {0}")]
    UnknownJobType(String),
    #[error("broker is unavailable: {0}")]
    BrokerUnavailable(String),
}

impl CoreError {
    /// The stable identifier used in `ValidationResult` issues and
    /// `JobResult.error.code`. Kept distinct from `Display` so log messages
    /// can carry more context than the wire code does.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::FileNotFound(_) => "FILE_NOT_FOUND",
            CoreError::InvalidExtension(_) => "INVALID_EXTENSION",
            CoreError::FileTooLarge(_) => "FILE_TOO_LARGE",
            CoreError::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            CoreError::UnsupportedPointFormat(_) => "UNSUPPORTED_POINT_FORMAT",
            CoreError::InsufficientPoints(_) => "INSUFFICIENT_POINTS",
            CoreError::MissingCrs => "MISSING_CRS",
            CoreError::InvertedBounds(_) => "INVERTED_BOUNDS",
            CoreError::ZeroScale(_) => "ZERO_SCALE",
            CoreError::InvalidParam { .. } => "INVALID_PARAM",
            CoreError::EmptyCloud => "EMPTY_CLOUD",
            CoreError::DegenerateTriangulation => "DEGENERATE_TRIANGULATION",
            CoreError::NoGroundPoints => "NO_GROUND_POINTS",
            CoreError::ReadFailed(_) => "READ_FAILED",
            CoreError::WriteFailed(_) => "WRITE_FAILED",
            CoreError::CodecUnavailable => "CODEC_UNAVAILABLE",
            CoreError::JobTimeout => "JOB_TIMEOUT",
            CoreError::UnknownJobType(_) => "UNKNOWN_JOB_TYPE",
            CoreError::BrokerUnavailable(_) => "BROKER_UNAVAILABLE",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
