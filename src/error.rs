use thiserror::Error;

use crate::ChartKind;

pub type Result<T> = std::result::Result<T, ChartError>;

/// Errors raised while reconstructing a chart.
///
/// Calibration errors abort the table of a bar or line chart. Geometry errors
/// are per entity: the pipeline logs them, counts them in the
/// [`ReconstructionReport`](crate::ReconstructionReport) and drops the entity.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("cannot calibrate axis: {reason}")]
    DegenerateAxis { reason: String },

    #[error("{kind:?} table requested without an axis mapping")]
    CalibrationMissing { kind: ChartKind },

    #[error("invalid bar box (width {width}, height {height})")]
    InvalidBox { width: f64, height: f64 },

    #[error("line series {series} has {count} point(s), need at least 2")]
    InsufficientPoints { series: usize, count: usize },

    #[error("category {category} record has {len} bbox values")]
    MalformedRecord { category: u32, len: usize },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChartError {
    pub(crate) fn degenerate_axis(reason: impl Into<String>) -> Self {
        Self::DegenerateAxis {
            reason: reason.into(),
        }
    }

    /// Calibration failures are fatal for the chart's table.
    pub fn is_calibration(&self) -> bool {
        matches!(
            self,
            Self::DegenerateAxis { .. } | Self::CalibrationMissing { .. }
        )
    }
}
