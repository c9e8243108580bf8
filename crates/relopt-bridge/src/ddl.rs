//! # Two-Phase DDL Execution
//!
//! Some DDL statements run for a long time (building an index, rebuilding a table).
//! Holding a repository transaction for the whole statement would lock the
//! repository, so such statements are split into three phases:
//!
//! ```text
//! Preparing          inside a repository transaction   prepare_unlocked
//! ExecutingUnlocked  no transaction held               execute_unlocked
//! CleaningUp         inside a fresh transaction        cleanup_after_execute_unlocked
//! ```
//!
//! [`TwoPhaseDdl`] drives a [`MultiTxnDdlStatement`] through these phases.
//! Transactions come from a [`RepositoryTxns`] implementation and are held by a
//! [`TxnScope`], which rolls back on drop unless committed. A failing phase therefore
//! never leaves a transaction open.
//!
//! The statement must not touch the repository while executing unlocked. Objects
//! read during cleanup that were loaded before must be protected against concurrent
//! modification by the caller (for instance by marking tables in use); the driver
//! does not check either rule.

use crate::error::{BoxError, BridgeError, Result};
use std::fmt;
use tracing::{debug, warn};

/// Kind of repository transaction to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnMode {
    ReadOnly,
    Write,
}

impl TxnMode {
    pub fn from_write(write: bool) -> Self {
        if write {
            TxnMode::Write
        } else {
            TxnMode::ReadOnly
        }
    }
}

impl fmt::Display for TxnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxnMode::ReadOnly => "read-only",
            TxnMode::Write => "write",
        })
    }
}

/// An open repository transaction.
pub trait RepositoryTxn {
    fn commit(self) -> Result<(), BoxError>;
    fn rollback(self);
}

/// Opens repository transactions.
pub trait RepositoryTxns {
    type Txn: RepositoryTxn;

    fn begin(&self, mode: TxnMode) -> Result<Self::Txn, BoxError>;
}

/// Scoped transaction: rolled back on drop unless [`TxnScope::commit`] was called.
pub struct TxnScope<T: RepositoryTxn> {
    txn: Option<T>,
    mode: TxnMode,
}

impl<T: RepositoryTxn> TxnScope<T> {
    pub fn begin<R>(repo: &R, mode: TxnMode) -> Result<Self>
    where
        R: RepositoryTxns<Txn = T>,
    {
        let txn = repo.begin(mode).map_err(|source| BridgeError::Txn {
            mode,
            action: "begin",
            source,
        })?;
        Ok(Self {
            txn: Some(txn),
            mode,
        })
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    pub fn commit(mut self) -> Result<()> {
        let Some(txn) = self.txn.take() else {
            return Ok(());
        };
        txn.commit().map_err(|source| BridgeError::Txn {
            mode: self.mode,
            action: "commit",
            source,
        })
    }
}

impl<T: RepositoryTxn> Drop for TxnScope<T> {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            warn!(mode = %self.mode, "rolling back repository transaction");
            txn.rollback();
        }
    }
}

/// A DDL statement whose execution spans several repository transactions.
pub trait MultiTxnDdlStatement {
    type Validator;
    type Session;

    /// Whether the transaction around [`Self::prepare_unlocked`] must allow writes.
    fn prepare_requires_write_txn(&self) -> bool {
        true
    }

    /// Read what the long-running phase needs. Runs inside a transaction.
    fn prepare_unlocked(
        &mut self,
        validator: &mut Self::Validator,
        session: &mut Self::Session,
    ) -> Result<(), BoxError>;

    /// The long-running work. Runs with no transaction held and must not access the
    /// repository; the session may still execute DML.
    fn execute_unlocked(
        &mut self,
        validator: &mut Self::Validator,
        session: &mut Self::Session,
    ) -> Result<(), BoxError>;

    /// Whether the transaction around [`Self::cleanup_after_execute_unlocked`] must
    /// allow writes.
    fn cleanup_requires_write_txn(&self) -> bool;

    /// Record the results of the unlocked phase. Runs inside a fresh transaction.
    fn cleanup_after_execute_unlocked(
        &mut self,
        validator: &mut Self::Validator,
        session: &mut Self::Session,
    ) -> Result<(), BoxError>;
}

/// Progress of a [`TwoPhaseDdl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DdlPhase {
    Preparing,
    ExecutingUnlocked,
    CleaningUp,
    Done,
    Failed,
}

impl DdlPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, DdlPhase::Done | DdlPhase::Failed)
    }
}

impl fmt::Display for DdlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DdlPhase::Preparing => "preparing",
            DdlPhase::ExecutingUnlocked => "executing unlocked",
            DdlPhase::CleaningUp => "cleaning up",
            DdlPhase::Done => "done",
            DdlPhase::Failed => "failed",
        })
    }
}

/// Drives a [`MultiTxnDdlStatement`] through its phases.
#[derive(Debug)]
pub struct TwoPhaseDdl<S> {
    statement: S,
    phase: DdlPhase,
}

impl<S: MultiTxnDdlStatement> TwoPhaseDdl<S> {
    pub fn new(statement: S) -> Self {
        Self {
            statement,
            phase: DdlPhase::Preparing,
        }
    }

    pub fn phase(&self) -> DdlPhase {
        self.phase
    }

    pub fn statement(&self) -> &S {
        &self.statement
    }

    pub fn into_inner(self) -> S {
        self.statement
    }

    /// Run the remaining phases to completion.
    pub fn run<R: RepositoryTxns>(
        &mut self,
        repo: &R,
        validator: &mut S::Validator,
        session: &mut S::Session,
    ) -> Result<()> {
        while self.phase != DdlPhase::Done {
            self.step(repo, validator, session)?;
        }
        Ok(())
    }

    /// Run the current phase and return the phase that follows it.
    ///
    /// On failure the statement moves to [`DdlPhase::Failed`] and any transaction
    /// opened for the phase is rolled back.
    pub fn step<R: RepositoryTxns>(
        &mut self,
        repo: &R,
        validator: &mut S::Validator,
        session: &mut S::Session,
    ) -> Result<DdlPhase> {
        let phase = self.phase;
        let statement = &mut self.statement;
        let result = match phase {
            DdlPhase::Preparing => {
                let mode = TxnMode::from_write(statement.prepare_requires_write_txn());
                in_txn(repo, mode, phase, || {
                    statement.prepare_unlocked(validator, session)
                })
                .map(|()| DdlPhase::ExecutingUnlocked)
            }
            DdlPhase::ExecutingUnlocked => statement
                .execute_unlocked(validator, session)
                .map(|()| DdlPhase::CleaningUp)
                .map_err(|source| BridgeError::Statement { phase, source }),
            DdlPhase::CleaningUp => {
                let mode = TxnMode::from_write(statement.cleanup_requires_write_txn());
                in_txn(repo, mode, phase, || {
                    statement.cleanup_after_execute_unlocked(validator, session)
                })
                .map(|()| DdlPhase::Done)
            }
            DdlPhase::Done | DdlPhase::Failed => return Err(BridgeError::InvalidPhase(phase)),
        };

        match result {
            Ok(next) => {
                debug!(from = %phase, to = %next, "DDL phase complete");
                self.phase = next;
                Ok(next)
            }
            Err(err) => {
                warn!(phase = %phase, error = %err, "DDL statement failed");
                self.phase = DdlPhase::Failed;
                Err(err)
            }
        }
    }
}

fn in_txn<R, F>(repo: &R, mode: TxnMode, phase: DdlPhase, f: F) -> Result<()>
where
    R: RepositoryTxns,
    F: FnOnce() -> Result<(), BoxError>,
{
    let scope = TxnScope::begin(repo, mode)?;
    f().map_err(|source| BridgeError::Statement { phase, source })?;
    scope.commit()
}
