// The internal crate defines one typed error per module; this crate wraps
// them in a single public-facing type so the API surface exposes exactly one
// error. Converting an internal error is always a `From` away, and callers
// who need the underlying detail can reach it through `source()`.

use skycorr_internal::{BinRangeError, FieldError, RegionError};

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The underlying error kind.
#[non_exhaustive]
#[derive(Clone, Debug)]
enum ErrorKind {
    /// A region-map construction failure. The unrecoverable partition
    /// failures (illegal region index, resolution ceiling) arrive through
    /// here; the map involved is left cleared.
    Region(RegionError),
    /// An angular bin was configured with an invalid range.
    BinRange(BinRangeError),
    /// A field-union construction or transform failure.
    Field(FieldError),
    /// A correlation driver was misconfigured.
    Correlation(CorrelationError),
}

/// Misconfigurations of the correlation drivers.
#[derive(Clone, Debug)]
pub(crate) enum CorrelationError {
    /// A binning constructor was asked for zero bins.
    EmptyBinning,
    /// A pixel-product driver was handed a bin that is not in pixel mode at
    /// the field's level.
    ModeMismatch { field_level: u32 },
    /// Cross-correlated fields live at different levels.
    LevelMismatch { level_a: u32, level_b: u32 },
}

impl core::fmt::Display for CorrelationError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            CorrelationError::EmptyBinning => {
                write!(f, "a correlation requires at least one angular bin")
            }
            CorrelationError::ModeMismatch { field_level } => write!(
                f,
                "pixel-product correlation requires a pixel-mode bin at the \
                 field's level ({field_level})"
            ),
            CorrelationError::LevelMismatch { level_a, level_b } => write!(
                f,
                "cross-correlated fields must share a level (got {level_a} and {level_b})"
            ),
        }
    }
}

impl std::error::Error for CorrelationError {}

// define constructor methods for Error
impl Error {
    /// produce an error indicating that a binning constructor was asked for
    /// zero bins
    pub(crate) fn empty_binning() -> Self {
        Error {
            kind: ErrorKind::Correlation(CorrelationError::EmptyBinning),
        }
    }

    /// produce an error indicating that a pixel-product driver was handed a
    /// bin whose mode does not match the field
    pub(crate) fn mode_mismatch(field_level: u32) -> Self {
        Error {
            kind: ErrorKind::Correlation(CorrelationError::ModeMismatch { field_level }),
        }
    }

    /// produce an error indicating that two fields live at different levels
    pub(crate) fn level_mismatch(level_a: u32, level_b: u32) -> Self {
        Error {
            kind: ErrorKind::Correlation(CorrelationError::LevelMismatch { level_a, level_b }),
        }
    }
}

impl From<RegionError> for Error {
    fn from(err: RegionError) -> Self {
        Error {
            kind: ErrorKind::Region(err),
        }
    }
}

impl From<BinRangeError> for Error {
    fn from(err: BinRangeError) -> Self {
        Error {
            kind: ErrorKind::BinRange(err),
        }
    }
}

impl From<FieldError> for Error {
    fn from(err: FieldError) -> Self {
        Error {
            kind: ErrorKind::Field(err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Region(err) => Some(err),
            ErrorKind::BinRange(err) => Some(err),
            ErrorKind::Field(err) => Some(err),
            ErrorKind::Correlation(err) => Some(err),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.kind.fmt(f)
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            ErrorKind::Region(ref err) => err.fmt(f),
            ErrorKind::BinRange(ref err) => err.fmt(f),
            ErrorKind::Field(ref err) => err.fmt(f),
            ErrorKind::Correlation(ref err) => err.fmt(f),
        }
    }
}
