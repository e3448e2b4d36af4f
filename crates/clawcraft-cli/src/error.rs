//! Error types for the `clawcraft` binary.
//!
//! [`CliError`] wraps every failure mode of a command run so `main` can
//! propagate with `?` and print one line.

/// Top-level error for the `clawcraft` binary.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: clawcraft_core::ConfigError,
    },

    /// The economy rejected the command.
    #[error("{source}")]
    Core {
        /// The underlying economy error.
        #[from]
        source: clawcraft_core::CoreError,
    },

    /// Loading or flushing state in `PostgreSQL` failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying database error.
        #[from]
        source: clawcraft_db::DbError,
    },

    /// Reading or writing the local state file failed.
    #[error("state file {path}: {message}")]
    StateFile {
        /// Path of the state file.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// Command output could not be rendered.
    #[error("output error: {source}")]
    Output {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// A simulation worker thread panicked.
    #[error("simulation worker {worker} panicked")]
    Worker {
        /// Index of the failed worker.
        worker: usize,
    },
}

impl From<clawcraft_ledger::LedgerError> for CliError {
    fn from(source: clawcraft_ledger::LedgerError) -> Self {
        Self::Core {
            source: source.into(),
        }
    }
}

impl From<clawcraft_factions::FactionError> for CliError {
    fn from(source: clawcraft_factions::FactionError) -> Self {
        Self::Core {
            source: source.into(),
        }
    }
}
