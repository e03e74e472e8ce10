#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("timestamps must be strictly increasing (sample {index})")]
    NonMonotonic { index: usize },
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("unknown agreement parameter '{0}'")]
    UnknownParameter(String),
    #[error("missing agreement parameter '{0}'")]
    MissingParameter(&'static str),
    #[error("column '{column}': cannot read '{value}' as {expected}")]
    Cell {
        column: String,
        value: String,
        expected: &'static str,
    },
}
