use thiserror::Error;

/// Missing credentials or an unusable config file. Fatal before any row runs.
#[derive(Debug, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

/// The batch cannot be evaluated at all.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input error: batch is empty")]
    EmptyBatch,
    #[error("input error: required column '{0}' is missing")]
    MissingColumn(String),
    #[error("input error: row {row}: {message}")]
    InvalidRow { row: usize, message: String },
    /// The file is not valid JSON; `line` is 1-based.
    #[error("input error: line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("input error: expected a JSON array of objects")]
    NotAnArray,
    #[error("input error: failed to read {path}: {message}")]
    Unreadable { path: String, message: String },
}

/// An external oracle call failed or answered with something unusable.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle timed out after {0}s")]
    Timeout(u64),
    #[error("oracle call failed: {0}")]
    Transport(String),
    #[error("oracle returned malformed output: {0}")]
    Malformed(String),
}

/// The evaluation database rejected a query.
#[derive(Debug, Error)]
#[error("query execution failed: {message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Entity extraction could not produce an `EntitySet`.
#[derive(Debug, Error)]
#[error("entity extraction failed: {0}")]
pub struct ExtractionError(#[from] pub OracleError);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Config,
    Input,
    Oracle,
    Execution,
}

/// Finds the first typed error in an `anyhow` chain.
pub fn try_map_error(e: &anyhow::Error) -> Option<ErrorClass> {
    for cause in e.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return Some(ErrorClass::Config);
        }
        if cause.downcast_ref::<InputError>().is_some() {
            return Some(ErrorClass::Input);
        }
        if cause.downcast_ref::<OracleError>().is_some()
            || cause.downcast_ref::<ExtractionError>().is_some()
        {
            return Some(ErrorClass::Oracle);
        }
        if cause.downcast_ref::<ExecutionError>().is_some() {
            return Some(ErrorClass::Execution);
        }
    }
    None
}
