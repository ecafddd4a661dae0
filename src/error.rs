use thiserror::Error;

/// Failures surfaced by the ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown {kind} label: {value:?}")]
    UnknownLabel { kind: &'static str, value: String },
    #[error("ledger at {} is unavailable", .0.display())]
    Unavailable(std::path::PathBuf),
    #[error("{0}")]
    Validation(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
