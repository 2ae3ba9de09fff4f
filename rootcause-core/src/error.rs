//! Error taxonomy for the correlation engine (spec §7).

use thiserror::Error;

/// All failure modes a search session can surface. Propagation is flat: no
/// internal catching, every error reaches the caller of `search(...)`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("required column '{0}' not found after normalization")]
    MissingColumn(String),

    #[error("first row's timestamp '{0}' does not parse as '%Y-%m-%d %H:%M:%S%.f'")]
    BadTimestamp(String),

    #[error("timestamps are not in ascending order (first {first} > last {last})")]
    OutOfOrder { first: String, last: String },

    #[error("strategy column '{0}' must be one of 'content' or 'service_template_id'")]
    BadStrategy(String),

    #[error("required input path does not exist: {0}")]
    MissingCacheInput(String),

    #[error("no row with line_id {0}")]
    NotFound(u64),

    #[error("uniqueness candidate type disagrees with noise-count key type for column '{0}'")]
    TypeMismatch(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize template miner state: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),

    #[error("invalid drain config: {0}")]
    Config(String),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
