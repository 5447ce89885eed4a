//! In-memory transactional ledger store.
//!
//! Every read and write goes through a [`UnitOfWork`]. `Store::begin` takes the
//! store-wide lock, so scopes are fully serialized: a scope observes every write
//! committed before it and nothing written by a concurrent caller.
//!
//! The store enforces referential integrity between records and keeps ledger
//! rows (transactions, payments, salary disbursements) append-only.

use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::model::{
    Bank, BankUser, Beneficiary, Client, Employee, Entity, Id, Payment, PaymentRequest,
    SalaryDisbursement, Transaction,
};

mod error;
pub use error::StoreError;

mod uow;
pub use uow::UnitOfWork;

#[cfg(test)]
pub(crate) mod fault;
#[cfg(test)]
pub(crate) use fault::Fault;

/// Kind of write, as seen by fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
    Delete,
    Commit,
}

/// A stored record type.
pub trait Record: Clone + Send + 'static {
    const ENTITY: Entity;
    /// Rows that may never be updated or deleted once inserted.
    const APPEND_ONLY: bool = false;

    fn id(&self) -> Id;
    fn assign_id(&mut self, id: Id);
    fn table(tables: &Tables) -> &Table<Self>;
    fn table_mut(tables: &mut Tables) -> &mut Table<Self>;
    /// Fails with [`StoreError::ForeignKey`] if a referenced row is missing.
    fn check_references(&self, tables: &Tables) -> Result<(), StoreError>;
}

/// Rows of one record type, keyed by id.
#[derive(Debug)]
pub struct Table<T> {
    rows: BTreeMap<Id, T>,
    /// Ids come from a sequence that, like a database sequence, survives rollback.
    last_id: Id,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct Tables {
    banks: Table<Bank>,
    bank_users: Table<BankUser>,
    clients: Table<Client>,
    beneficiaries: Table<Beneficiary>,
    payment_requests: Table<PaymentRequest>,
    transactions: Table<Transaction>,
    payments: Table<Payment>,
    employees: Table<Employee>,
    disbursements: Table<SalaryDisbursement>,
    #[cfg(test)]
    faults: fault::Faults,
}

impl Tables {
    fn require<T: Record>(&self, id: Id) -> Result<(), StoreError> {
        if T::table(self).rows.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKey {
                entity: T::ENTITY,
                id,
            })
        }
    }

    #[cfg(test)]
    fn trip(&mut self, entity: Option<Entity>, op: WriteOp) -> Result<(), StoreError> {
        self.faults.trip(entity, op)
    }

    #[cfg(not(test))]
    #[inline]
    fn trip(&mut self, _entity: Option<Entity>, _op: WriteOp) -> Result<(), StoreError> {
        Ok(())
    }
}

macro_rules! record {
    (
        $ty:ident in $field:ident $(, append_only = $append:literal)?,
        |$row:pat_param, $tables:pat_param| $refs:block
    ) => {
        impl Record for $ty {
            const ENTITY: Entity = Entity::$ty;
            $(const APPEND_ONLY: bool = $append;)?

            fn id(&self) -> Id {
                self.id
            }

            fn assign_id(&mut self, id: Id) {
                self.id = id;
            }

            fn table(tables: &Tables) -> &Table<Self> {
                &tables.$field
            }

            fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
                &mut tables.$field
            }

            fn check_references(&self, $tables: &Tables) -> Result<(), StoreError> {
                let $row = self;
                $refs
            }
        }
    };
}

record!(Bank in banks, |_, _| { Ok(()) });

record!(BankUser in bank_users, |link, tables| {
    tables.require::<Bank>(link.bank_id)
});

record!(Client in clients, |client, tables| {
    tables.require::<Bank>(client.bank_id)
});

record!(Beneficiary in beneficiaries, |beneficiary, tables| {
    tables.require::<Client>(beneficiary.client_id)?;
    tables.require::<Client>(beneficiary.receiver_id)
});

record!(PaymentRequest in payment_requests, |request, tables| {
    tables.require::<Client>(request.sender_id)?;
    tables.require::<Client>(request.receiver_id)?;
    tables.require::<Bank>(request.authorizer_bank_id)
});

record!(Transaction in transactions, append_only = true, |tx, tables| {
    tables.require::<Client>(tx.client_id)
});

record!(Payment in payments, append_only = true, |payment, tables| {
    tables.require::<PaymentRequest>(payment.request_id)?;
    tables.require::<Client>(payment.sender_id)?;
    tables.require::<Client>(payment.receiver_id)?;
    tables.require::<Bank>(payment.authorized_bank_id)?;
    tables.require::<Transaction>(payment.debit_transaction_id)?;
    tables.require::<Transaction>(payment.credit_transaction_id)
});

record!(Employee in employees, |employee, tables| {
    tables.require::<Client>(employee.client_id)
});

record!(SalaryDisbursement in disbursements, append_only = true, |disbursement, tables| {
    tables.require::<Client>(disbursement.client_id)?;
    tables.require::<Employee>(disbursement.employee_id)?;
    tables.require::<Transaction>(disbursement.transaction_id)
});

/// Shared handle to the ledger tables.
#[derive(Debug, Default)]
pub struct Store {
    tables: Mutex<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a unit of work. Waits until every other open scope has finished.
    pub async fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork::new(self.tables.lock().await)
    }

    /// Arm a one-shot write failure.
    #[cfg(test)]
    pub(crate) async fn inject_fault(&self, fault: Fault) {
        self.tables.lock().await.faults.arm(fault);
    }
}
