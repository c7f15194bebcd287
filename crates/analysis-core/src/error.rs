use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// A provider returned no rows for the requested series.
    #[error("No data available for {ticker} between {start} and {end}")]
    DataUnavailable {
        ticker: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Degenerate fit: {0}")]
    DegenerateFit(String),

    #[error("Aligned panel is empty: price and factor data share no months")]
    AlignmentEmpty,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl AnalysisError {
    pub fn data_unavailable(ticker: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        AnalysisError::DataUnavailable {
            ticker: ticker.into(),
            start,
            end,
        }
    }

    /// True for failures that only affect a single model, not the whole request.
    pub fn is_degenerate(&self) -> bool {
        matches!(self, AnalysisError::DegenerateFit(_) | AnalysisError::AlignmentEmpty)
    }

    /// Short machine-readable tag used in API error bodies and model warnings.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::DataUnavailable { .. } => "data_unavailable",
            AnalysisError::DegenerateFit(_) => "degenerate_fit",
            AnalysisError::AlignmentEmpty => "alignment_empty",
            AnalysisError::InvalidData(_) => "invalid_data",
            AnalysisError::ApiError(_) => "api_error",
        }
    }
}
