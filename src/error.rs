use thiserror::Error;

use crate::data::LineRole;

/// Failure kinds raised by the detection engine.
///
/// `InsufficientData` and `InvalidParameter` abort an analysis. The other
/// kinds belong to a single detector and only leave its output absent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("not enough prominent peaks ({maxima} maxima, {minima} minima; need 2 of each)")]
    InsufficientPeaks { maxima: usize, minima: usize },

    #[error("no local {role} trend: {extrema} extrema inside the working window")]
    NoLocalTrend { role: LineRole, extrema: usize },

    #[error("no admissible global {role} line with the required touches")]
    NoGlobalTrend { role: LineRole },

    #[error("no price interval was touched by any candle")]
    InsufficientLevels,
}

impl AnalysisError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Whether the error aborts the whole analysis rather than a single detector.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AnalysisError::InsufficientData(_) | AnalysisError::InvalidParameter { .. }
        )
    }
}
