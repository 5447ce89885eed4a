//! Error types for ledger operations.

use thiserror::Error;

use crate::Amount;
use crate::model::{BankId, ClientId, EmployeeId, Entity, Id, PaymentRequestId, Status, UserId};
use crate::store::StoreError;

/// Error returned by every [`Engine`](super::Engine) operation.
///
/// Any error raised inside a unit of work leaves the store exactly as it was
/// before the operation started.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} {1} not found")]
    NotFound(Entity, Id),

    #[error("user {user} has no jurisdiction over bank {bank}")]
    Unauthorized { user: UserId, bank: BankId },

    #[error("insufficient balance for client {client}: available {available}, requested {requested}")]
    InsufficientBalance {
        client: ClientId,
        available: Amount,
        requested: Amount,
    },

    #[error("client {client} already has beneficiary client {receiver}")]
    DuplicateBeneficiary { client: ClientId, receiver: ClientId },

    #[error("client {0} cannot be its own beneficiary")]
    SelfBeneficiary(ClientId),

    #[error("employee account {0} is already registered")]
    DuplicateEmployee(String),

    #[error("employee {0} has received salary and cannot be removed")]
    EmployeeHasDisbursements(EmployeeId),

    #[error("payment request {request} is already {status}")]
    AlreadyResolved {
        request: PaymentRequestId,
        status: Status,
    },

    #[error("invalid amount {0}")]
    InvalidAmount(Amount),

    /// A balance or running total would leave the range of [`Amount`].
    #[error("{0} {1} amount out of range")]
    Overflow(Entity, Id),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse classification for callers mapping errors to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InsufficientBalance,
    /// The operation conflicts with existing state (duplicates, terminal requests).
    Conflict,
    Invalid,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(..) => ErrorKind::NotFound,
            EngineError::Unauthorized { .. } => ErrorKind::Unauthorized,
            EngineError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            EngineError::DuplicateBeneficiary { .. }
            | EngineError::DuplicateEmployee(_)
            | EngineError::EmployeeHasDisbursements(_)
            | EngineError::AlreadyResolved { .. } => ErrorKind::Conflict,
            EngineError::SelfBeneficiary(_)
            | EngineError::InvalidAmount(_)
            | EngineError::Overflow(..) => ErrorKind::Invalid,
            EngineError::Store(_) => ErrorKind::Internal,
        }
    }
}
