use thiserror::Error;

/// Structural errors. Anything here is fatal at startup and reported once;
/// per-row problems are collected as [`crate::model::RowIssue`] instead.
#[derive(Debug, Error)]
pub enum CrosswalkError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (bad width, bad cascade, missing bridge, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Missing required column in an input table.
    #[error("table '{table}': missing column '{column}'")]
    MissingColumn { table: String, column: String },
    /// A reference or correspondence code failed fixed-width validation.
    #[error("table '{table}', row {row}: malformed code '{value}' ({reason})")]
    MalformedReferenceCode {
        table: String,
        row: usize,
        value: String,
        reason: String,
    },
    /// A reference score could not be parsed as a number.
    #[error("table '{table}', row {row}: cannot parse score '{value}'")]
    ScoreParse { table: String, row: usize, value: String },
    /// The bridge maps into a different vocabulary than the dictionary is keyed in.
    #[error("bridge targets vocabulary '{bridge}' but the dictionary is keyed in '{dictionary}'")]
    VocabularyMismatch { bridge: String, dictionary: String },
    /// IO / CSV read error.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<csv::Error> for CrosswalkError {
    fn from(e: csv::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<std::io::Error> for CrosswalkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
