//! Error types for the sequence engine.
//!
//! Every fatal error names the algorithm it came from (when there is one)
//! and the exact bank, column or option that was missing or mismatched.
//! [`Error::kind`] groups variants into the broad categories callers
//! usually branch on.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::algorithm::{Role, State};
use crate::config::OptionKind;
use crate::schema::ColumnType;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing, unreadable or mistyped configuration; fatal at `Start`.
    Configuration,
    /// Missing bank or column, or a malformed schema; fatal at `Start`.
    Schema,
    /// Name collision when adding an algorithm or bank.
    DuplicateName,
    /// A bank, algorithm or class could not be found by name or index.
    Lookup,
    /// One or more algorithms failed during `Stop`.
    Stop,
    /// An operation was called in the wrong lifecycle state.
    Usage,
    /// Bad per-event content detected while running.
    Data,
}

/// One algorithm's failure during `Stop`.
#[derive(Debug)]
pub struct StopFailure {
    pub algorithm: String,
    pub error: Error,
}

/// The engine's error type.
#[derive(Debug, Error)]
pub enum Error {
    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------
    #[error("algorithm '{algorithm}': option '{option}' is not set by any configuration source")]
    OptionNotFound { algorithm: String, option: String },

    #[error("algorithm '{algorithm}': option '{option}' is {found}, expected {expected}")]
    OptionTypeMismatch {
        algorithm: String,
        option: String,
        expected: OptionKind,
        found: String,
    },

    #[error("algorithm '{algorithm}': option '{option}' is invalid: {reason}")]
    InvalidOption {
        algorithm: String,
        option: String,
        reason: String,
    },

    #[error("configuration file '{}' not found", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("cannot read configuration file '{}': {source}", path.display())]
    ConfigFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration file '{}': {source}", path.display())]
    ConfigFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration file '{}': section '{section}' is not an object", path.display())]
    InvalidConfigSection { path: PathBuf, section: String },

    // ---------------------------------------------------------------------
    // Schema
    // ---------------------------------------------------------------------
    #[error("algorithm '{algorithm}': required bank '{bank}' not found in the bank list")]
    BankNotFound { algorithm: String, bank: String },

    #[error("algorithm '{algorithm}': bank '{bank}' has no required column '{column}'")]
    RequiredColumnMissing {
        algorithm: String,
        bank: String,
        column: String,
    },

    #[error("bank '{bank}' has no column '{column}'")]
    ColumnNotFound { bank: String, column: String },

    #[error("bank '{bank}': column '{column}' holds {found}, not {expected}")]
    TypeMismatch {
        bank: String,
        column: String,
        expected: ColumnType,
        found: ColumnType,
    },

    #[error("bank '{bank}': row {row} is out of range ({rows} rows)")]
    RowOutOfRange {
        bank: String,
        row: usize,
        rows: usize,
    },

    #[error("no schema is registered for bank '{0}'")]
    UnknownBank(String),

    #[error("invalid schema for bank '{bank}': {reason}")]
    InvalidSchema { bank: String, reason: String },

    // ---------------------------------------------------------------------
    // Duplicate names
    // ---------------------------------------------------------------------
    #[error("sequence '{sequence}' already contains an algorithm named '{algorithm}'")]
    DuplicateAlgorithm { sequence: String, algorithm: String },

    #[error("algorithm class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("the bank list already contains a bank named '{0}'")]
    DuplicateBank(String),

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------
    #[error("sequence '{sequence}' has no algorithm named '{algorithm}'")]
    AlgorithmNotFound { sequence: String, algorithm: String },

    #[error("no algorithm class named '{0}' is registered")]
    UnknownAlgorithm(String),

    #[error("bank '{0}' is not in the bank list")]
    NoSuchBank(String),

    #[error("bank index {index} is out of range for a list of {len} banks")]
    BankIndexOutOfRange { index: usize, len: usize },

    #[error("algorithm '{0}' is not a creator")]
    NotACreator(String),

    #[error("algorithm '{algorithm}' created {count} banks; ask for them by name")]
    AmbiguousCreatedBank { algorithm: String, count: usize },

    // ---------------------------------------------------------------------
    // Usage
    // ---------------------------------------------------------------------
    #[error("algorithm '{algorithm}': cannot {operation} while {state}")]
    InvalidState {
        algorithm: String,
        operation: &'static str,
        state: State,
    },

    #[error("sequence '{0}' has been started; algorithms can no longer be added")]
    SequenceStarted(String),

    #[error("algorithm '{0}' was started without banks; call its action functions instead")]
    RowsOnly(String),

    #[error("algorithm '{algorithm}' has role {role} but {reason}")]
    RoleViolation {
        algorithm: String,
        role: Role,
        reason: String,
    },

    // ---------------------------------------------------------------------
    // Data
    // ---------------------------------------------------------------------
    #[error("algorithm '{algorithm}': created bank '{bank}' has {rows} rows, expected {expected}")]
    RowCountMismatch {
        algorithm: String,
        bank: String,
        rows: usize,
        expected: usize,
    },

    #[error("bank '{bank}': {reason}")]
    InvalidData { bank: String, reason: String },

    // ---------------------------------------------------------------------
    // Lifecycle wrappers
    // ---------------------------------------------------------------------
    #[error("cannot start algorithm '{algorithm}': {source}")]
    Start {
        algorithm: String,
        #[source]
        source: Box<Error>,
    },

    #[error("algorithm '{algorithm}' failed: {source}")]
    Run {
        algorithm: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{}", StopSummary(.0))]
    Stop(Vec<StopFailure>),
}

impl Error {
    /// The category of this error. Wrappers report the kind of their cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OptionNotFound { .. }
            | Error::OptionTypeMismatch { .. }
            | Error::InvalidOption { .. }
            | Error::ConfigFileNotFound { .. }
            | Error::ConfigFileRead { .. }
            | Error::ConfigFileParse { .. }
            | Error::InvalidConfigSection { .. } => ErrorKind::Configuration,
            Error::BankNotFound { .. }
            | Error::RequiredColumnMissing { .. }
            | Error::ColumnNotFound { .. }
            | Error::TypeMismatch { .. }
            | Error::RowOutOfRange { .. }
            | Error::UnknownBank(_)
            | Error::InvalidSchema { .. } => ErrorKind::Schema,
            Error::DuplicateAlgorithm { .. } | Error::DuplicateClass(_) | Error::DuplicateBank(_) => {
                ErrorKind::DuplicateName
            }
            Error::AlgorithmNotFound { .. }
            | Error::UnknownAlgorithm(_)
            | Error::NoSuchBank(_)
            | Error::BankIndexOutOfRange { .. }
            | Error::NotACreator(_)
            | Error::AmbiguousCreatedBank { .. } => ErrorKind::Lookup,
            Error::InvalidState { .. }
            | Error::SequenceStarted(_)
            | Error::RowsOnly(_)
            | Error::RoleViolation { .. } => ErrorKind::Usage,
            Error::RowCountMismatch { .. } | Error::InvalidData { .. } => ErrorKind::Data,
            Error::Start { source, .. } | Error::Run { source, .. } => source.kind(),
            Error::Stop(_) => ErrorKind::Stop,
        }
    }

    /// The innermost error, looking through `Start` and `Run` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Start { source, .. } | Error::Run { source, .. } => source.root(),
            other => other,
        }
    }
}

struct StopSummary<'a>(&'a [StopFailure]);

impl fmt::Display for StopSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} algorithm(s) failed to stop", self.0.len())?;
        for failure in self.0 {
            write!(f, "; '{}': {}", failure.algorithm, failure.error)?;
        }
        Ok(())
    }
}
