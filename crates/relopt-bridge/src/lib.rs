//! # relopt-bridge: Boundary Adapters
//!
//! Two thin adapters sit at the edges of the optimizer and carry no planning logic.
//!
//! ## Module Overview
//!
//! - **`tuple_stream`**: A pull-based stream that marshals rows from a restartable
//!   row source into buffers owned by an external execution engine.
//! - **`ddl`**: A state machine running long DDL statements across several
//!   repository transactions, so no repository lock is held during the long part.
//! - **`error`**: Error types.

pub mod ddl;
pub mod error;
pub mod tuple_stream;

pub use ddl::{
    DdlPhase, MultiTxnDdlStatement, RepositoryTxn, RepositoryTxns, TwoPhaseDdl, TxnMode, TxnScope,
};
pub use error::{BoxError, BridgeError, Result};
pub use tuple_stream::{
    Datum, IterRowSource, NativeTupleWriter, PullTupleStream, RowSource, TupleWriter, VecRowSource,
};
