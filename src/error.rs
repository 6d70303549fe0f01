use crate::schema::PeriodId;
use thiserror::Error;

/// Broad classification of a [`ReportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structural violation caught while editing a configuration.
    Configuration,
    /// Failure raised while computing a report; aborts the whole computation.
    Computation,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("You cannot sum period {0} with itself.")]
    SelfSum(String),

    #[error("A date filter is mandatory for this source in column {0}.")]
    DateFilterRequired(String),

    #[error("No date filter is allowed for this source in column {0}.")]
    DateFilterForbidden(String),

    #[error("Please provide both columns to compare in {0}.")]
    CompareColumnsMissing(String),

    #[error("Column {0} cannot be compared to itself.")]
    CompareWithItself(String),

    #[error("Columns to compare must belong to the same report in {0}")]
    CompareAcrossInstances(String),

    #[error("Column {column} sums column #{target} which does not belong to the same report")]
    UnknownSumColumn { column: String, target: PeriodId },

    #[error("Wrong duration {duration} in column {column}, it must be positive!")]
    InvalidDuration { column: String, duration: i64 },

    #[error("Wrong normalize factor {factor} in column {column}, it must be positive!")]
    InvalidNormalizeFactor { column: String, factor: i64 },

    #[error("Period name should be unique by report: {0}")]
    DuplicatePeriodName(String),

    #[error("Parameter {0} has more than one value in this report instance")]
    DuplicateParamValue(String),

    #[error("Unknown column #{0}")]
    UnknownPeriod(PeriodId),

    #[error("Column {0} does not sum other columns")]
    NotSumColumns(String),

    #[error("Column {column} cannot be removed, it is used by column {used_by}")]
    ColumnInUse { column: String, used_by: String },

    #[error("Column {0} is part of a circular sum of columns")]
    CircularSum(String),

    #[error("Column {0} with actuals source must have from/to dates.")]
    MissingDateRange(String),

    #[error("Unsupported parameter type: '{0}'.")]
    UnsupportedParamType(String),

    #[error("Parameter '{param}' error. Can't find any {model} records with {search_field} equal to '{value}'.")]
    ParamResolution {
        param: String,
        model: String,
        search_field: String,
        value: String,
    },

    #[error("Column #{0} is referenced before being declared in the matrix")]
    UnknownColumn(PeriodId),

    #[error("Report template error: {0}")]
    Template(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ReportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReportError::SelfSum(_)
            | ReportError::DateFilterRequired(_)
            | ReportError::DateFilterForbidden(_)
            | ReportError::CompareColumnsMissing(_)
            | ReportError::CompareWithItself(_)
            | ReportError::CompareAcrossInstances(_)
            | ReportError::UnknownSumColumn { .. }
            | ReportError::InvalidDuration { .. }
            | ReportError::InvalidNormalizeFactor { .. }
            | ReportError::DuplicatePeriodName(_)
            | ReportError::DuplicateParamValue(_)
            | ReportError::UnknownPeriod(_)
            | ReportError::NotSumColumns(_)
            | ReportError::ColumnInUse { .. }
            | ReportError::CircularSum(_) => ErrorKind::Configuration,
            ReportError::MissingDateRange(_)
            | ReportError::UnsupportedParamType(_)
            | ReportError::ParamResolution { .. }
            | ReportError::UnknownColumn(_)
            | ReportError::Template(_)
            | ReportError::SerializationError(_) => ErrorKind::Computation,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
