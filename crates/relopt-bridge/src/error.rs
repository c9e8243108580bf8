//! Error type shared by the bridge adapters.

use crate::ddl::{DdlPhase, TxnMode};

/// Boxed error raised by a statement or repository implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A single row needs more space than an empty buffer offers. The row is kept and
    /// is marshaled again by the next call.
    #[error("row does not fit in an empty buffer of {capacity} bytes")]
    RowTooLarge { capacity: usize },

    /// The statement already finished or failed and cannot advance.
    #[error("DDL statement cannot advance from phase '{0}'")]
    InvalidPhase(DdlPhase),

    #[error("DDL statement failed while {phase}")]
    Statement {
        phase: DdlPhase,
        #[source]
        source: BoxError,
    },

    #[error("could not {action} {mode} repository transaction")]
    Txn {
        mode: TxnMode,
        action: &'static str,
        #[source]
        source: BoxError,
    },
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
