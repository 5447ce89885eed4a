//! Error types for store operations.

use thiserror::Error;

use super::WriteOp;
use crate::model::{Entity, Id};

/// A write rejected by the store. Any of these aborts the enclosing unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} {id} is referenced but does not exist")]
    ForeignKey { entity: Entity, id: Id },

    #[error("{entity} {id} does not exist")]
    RowNotFound { entity: Entity, id: Id },

    #[error("{entity} {id} is append-only and cannot be changed")]
    Immutable { entity: Entity, id: Id },

    /// Only produced by fault injection in tests.
    #[error("injected failure on {op:?}")]
    Injected { op: WriteOp },
}
