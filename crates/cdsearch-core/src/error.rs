//! Error types for scorer construction and per-target computation.

/// Invalid construction parameter. Raised before any scoring work starts.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Shape scoring needs a strictly positive dilation radius.
    NonPositiveNegativeRadius(i32),
    /// Shift radius must be even (variants are generated in steps of 2).
    OddXyShift(u32),
    /// Color fluctuation tolerance must be finite and non-negative.
    InvalidColorFluctuation(f64),
    /// A threshold outside the 8-bit channel range.
    ThresholdOutOfRange { name: &'static str, value: u32 },
    /// Auxiliary query image (negative mask, ROI) does not match the mask.
    QueryDimensionMismatch {
        image: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// Building a derived query image failed.
    InvalidQuery(ComputeError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveNegativeRadius(r) => {
                write!(f, "negative radius must be > 0, got {r}")
            }
            Self::OddXyShift(s) => write!(f, "xy shift must be even, got {s}"),
            Self::InvalidColorFluctuation(v) => {
                write!(f, "pixel color fluctuation must be finite and >= 0, got {v}")
            }
            Self::ThresholdOutOfRange { name, value } => {
                write!(f, "{name} must be in 0..=255, got {value}")
            }
            Self::QueryDimensionMismatch {
                image,
                expected,
                found,
            } => write!(
                f,
                "{image} is {}x{}, expected {}x{}",
                found.0, found.1, expected.0, expected.1
            ),
            Self::InvalidQuery(e) => write!(f, "invalid query: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidQuery(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ComputeError> for ConfigError {
    fn from(e: ComputeError) -> Self {
        Self::InvalidQuery(e)
    }
}

/// Unexpected failure while scoring one (mask, target) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    /// Two images combined point-wise have different sizes.
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// A raw pixel buffer does not hold `width * height` pixels.
    BufferLength { expected: usize, found: usize },
}

impl std::fmt::Display for ComputeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DimensionMismatch { expected, found } => write!(
                f,
                "image dimensions mismatch: expected {}x{}, found {}x{}",
                expected.0, expected.1, found.0, found.1
            ),
            Self::BufferLength { expected, found } => {
                write!(f, "pixel buffer holds {found} pixels, expected {expected}")
            }
        }
    }
}

impl std::error::Error for ComputeError {}
