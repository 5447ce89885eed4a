//! Payment ledger engine.
//!
//! The engine owns the ledger store and exposes the banking workflows on top of
//! it: beneficiary registry, payment requests, the approval state machine,
//! salary disbursement and read-only reports. Each operation runs inside exactly
//! one unit of work. Also supports an async stream of commands.

use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::Amount;
use crate::model::{
    Bank, BankId, BankUser, Client, ClientId, Command, Id, NewClient, UserId, VerificationStatus,
};
use crate::notify::NotificationSink;
use crate::store::{Record, Store, UnitOfWork};

mod approval;
mod beneficiary;
mod report;
mod request;
mod salary;

pub use report::{CounterpartyTotals, EmployeePayment, PaymentReport, SalaryReport};

mod error;
pub use error::{EngineError, ErrorKind};

/// The payment ledger engine.
///
/// All operations take `&self`; wrap the engine in an `Arc` to share it between
/// tasks. Concurrent operations are serialized by the store.
#[derive(Debug, Default)]
pub struct Engine {
    store: Store,
    notifications: NotificationSink,
}

/// Public API
impl Engine {
    pub fn new(notifications: NotificationSink) -> Self {
        Self {
            store: Store::new(),
            notifications,
        }
    }

    /// Run the engine over the given command stream
    pub async fn run(&self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            // a rejected command must not stop the replay; `apply` already logged it
            let _ = self.apply(command).await;
        }
    }

    /// Apply a single command on top of the current ledger state
    pub async fn apply(&self, command: Command) -> Result<(), EngineError> {
        let op = command.name();
        let result = match command {
            Command::RegisterBank { name, abbreviation } => self
                .register_bank(&name, &abbreviation)
                .await
                .map(|_| ()),
            Command::RegisterClient(new_client) => {
                self.register_client(new_client).await.map(|_| ())
            }
            Command::AssignBankUser { bank, user } => {
                self.assign_bank_user(bank, user).await.map(|_| ())
            }
            Command::CreateBeneficiary {
                client,
                receiver,
                name,
            } => self
                .create_beneficiary(client, receiver, &name)
                .await
                .map(|_| ()),
            Command::DeleteBeneficiary {
                client,
                beneficiary,
            } => self
                .delete_beneficiary(client, beneficiary)
                .await
                .map(|_| ()),
            Command::RequestPayment {
                client,
                user,
                beneficiary,
                amount,
            } => self
                .create_payment_request(client, user, amount, beneficiary)
                .await
                .map(|_| ()),
            Command::ApprovePayment { request, user } => self
                .approve_payment_request(request, user)
                .await
                .map(|_| ()),
            Command::RejectPayment { request, user } => self
                .reject_payment_request(request, user)
                .await
                .map(|_| ()),
            Command::AddEmployee {
                client,
                account_no,
                salary,
            } => self
                .add_employee(client, &account_no, salary)
                .await
                .map(|_| ()),
            Command::DisburseSalary {
                client,
                user,
                employee: Some(employee),
            } => self
                .disburse_salary(client, employee, user)
                .await
                .map(|_| ()),
            Command::DisburseSalary {
                client,
                user,
                employee: None,
            } => self.disburse_all_salaries(client, user).await.map(|_| ()),
            Command::VerifyClient {
                client,
                user,
                status,
            } => self.verify_client(client, user, status).await.map(|_| ()),
        };

        match &result {
            Ok(()) => debug!("{op} applied"),
            Err(e) => info!(reason = %e, kind = ?e.kind(), "{op} skipped"),
        }
        result
    }

    pub async fn register_bank(&self, name: &str, abbreviation: &str) -> Result<Bank, EngineError> {
        let mut uow = self.store.begin().await;
        let bank = uow.insert(Bank {
            id: 0,
            name: name.to_string(),
            abbreviation: abbreviation.to_string(),
            is_active: true,
        })?;
        uow.commit()?;

        info!(bank = bank.id, name = %bank.name, "bank registered");
        Ok(bank)
    }

    /// Open a client account at an existing bank.
    pub async fn register_client(&self, new_client: NewClient) -> Result<Client, EngineError> {
        if new_client.opening_balance.is_negative() {
            return Err(EngineError::InvalidAmount(new_client.opening_balance));
        }

        let mut uow = self.store.begin().await;
        fetch::<Bank>(&uow, new_client.bank_id)?;
        let client = uow.insert(Client {
            id: 0,
            bank_id: new_client.bank_id,
            name: new_client.name,
            email: new_client.email,
            balance: new_client.opening_balance,
            is_active: true,
            verification: VerificationStatus::Pending,
        })?;
        uow.commit()?;

        info!(
            client = client.id,
            bank = client.bank_id,
            balance = %client.balance,
            "client registered"
        );
        Ok(client)
    }

    /// Give `user` jurisdiction over payment requests authorized by `bank`.
    /// Assigning an existing link returns it unchanged.
    pub async fn assign_bank_user(&self, bank: BankId, user: UserId) -> Result<BankUser, EngineError> {
        let mut uow = self.store.begin().await;
        fetch::<Bank>(&uow, bank)?;
        if let Some(link) = uow.first::<BankUser>(|l| l.bank_id == bank && l.user_id == user) {
            return Ok(link);
        }
        let link = uow.insert(BankUser {
            id: 0,
            bank_id: bank,
            user_id: user,
        })?;
        uow.commit()?;

        info!(bank, user, "bank user assigned");
        Ok(link)
    }

    /// Record the outcome of a client review by a bank user of the client's bank.
    pub async fn verify_client(
        &self,
        client: ClientId,
        user: UserId,
        status: VerificationStatus,
    ) -> Result<Client, EngineError> {
        let mut uow = self.store.begin().await;
        let mut reviewed: Client = fetch(&uow, client)?;
        authorize(&uow, user, reviewed.bank_id)?;

        reviewed.verification = status;
        uow.update(&reviewed)?;
        uow.commit()?;

        info!(client, user, status = ?status, "client verification updated");
        Ok(reviewed)
    }

    pub async fn client(&self, id: ClientId) -> Result<Client, EngineError> {
        let uow = self.store.begin().await;
        fetch(&uow, id)
    }

    /// Every client, ordered by id.
    pub async fn clients(&self) -> Vec<Client> {
        let uow = self.store.begin().await;
        uow.select(|_: &Client| true)
    }

    /// Sum of every client balance, `None` if it does not fit an [`Amount`].
    pub async fn total_balance(&self) -> Option<Amount> {
        Amount::checked_sum(self.clients().await.into_iter().map(|c| c.balance))
    }
}

/// Look up a row, mapping absence to [`EngineError::NotFound`].
fn fetch<T: Record>(uow: &UnitOfWork<'_>, id: Id) -> Result<T, EngineError> {
    uow.get(id).ok_or(EngineError::NotFound(T::ENTITY, id))
}

/// The user must be a bank user of `bank`.
fn authorize(uow: &UnitOfWork<'_>, user: UserId, bank: BankId) -> Result<(), EngineError> {
    uow.first::<BankUser>(|link| link.bank_id == bank && link.user_id == user)
        .map(|_| ())
        .ok_or(EngineError::Unauthorized { user, bank })
}
