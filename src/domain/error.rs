//! Domain-level errors (no I/O, no configuration)

use std::fmt;

use thiserror::Error;

/// Geometric reasons for rejecting a trial placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryViolation {
    /// Trial segment crosses a neighbouring vessel
    VesselCrossing,
    /// Trial segment leaves the domain or enters an exclusion region
    OutsideDomain,
    /// Bifurcation angle outside the admissible range
    AngleBound,
    /// New branch too close to the plane of the split parent
    OpeningAngle,
    /// Degenerate segment (zero length)
    Degenerate,
}

impl fmt::Display for GeometryViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GeometryViolation::VesselCrossing => "crosses a neighbouring vessel",
            GeometryViolation::OutsideDomain => "leaves the domain",
            GeometryViolation::AngleBound => "violates the bifurcation angle bound",
            GeometryViolation::OpeningAngle => "opens too close to the parent plane",
            GeometryViolation::Degenerate => "degenerate segment",
        };
        f.write_str(label)
    }
}

/// Domain errors represent violations of the growth rules.
///
/// Everything except `InvalidParameter` and `VesselNotFound` is recoverable:
/// the generator rejects the candidate or drops the terminal and continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("domain sampling exhausted after {attempts} draws")]
    DomainSamplingExhausted { attempts: usize },

    #[error("invalid topology: {message}")]
    InvalidTopology { message: String },

    #[error("geometry rejected: {violation}")]
    GeometryIntersection { violation: GeometryViolation },

    #[error("hydraulic constraint violated: {message}")]
    HydraulicConstraintViolation { message: String },

    #[error("invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("vessel not found in tree")]
    VesselNotFound,
}

impl DomainError {
    pub fn topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology {
            message: message.into(),
        }
    }

    pub fn hydraulic(message: impl Into<String>) -> Self {
        Self::HydraulicConstraintViolation {
            message: message.into(),
        }
    }

    pub fn parameter(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    /// True for the reject-and-continue family.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DomainError::DomainSamplingExhausted { .. }
                | DomainError::InvalidTopology { .. }
                | DomainError::GeometryIntersection { .. }
                | DomainError::HydraulicConstraintViolation { .. }
        )
    }
}

impl From<GeometryViolation> for DomainError {
    fn from(violation: GeometryViolation) -> Self {
        DomainError::GeometryIntersection { violation }
    }
}

/// Result type for domain layer operations.
pub type DomainResult<T> = Result<T, DomainError>;
