//! Core domain types for the payment ledger.

use serde::Serialize;
use std::fmt;

use crate::Amount;

/// Row identifier shared by every table.
pub type Id = u32;

pub type BankId = Id;
pub type ClientId = Id;
/// Users are owned by the authentication provider; the ledger only stores their ids.
pub type UserId = Id;
pub type BeneficiaryId = Id;
pub type PaymentRequestId = Id;
pub type TransactionId = Id;
pub type PaymentId = Id;
pub type EmployeeId = Id;
pub type DisbursementId = Id;

/// Kinds of stored records, used to tag lookups and integrity failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Bank,
    BankUser,
    Client,
    Beneficiary,
    PaymentRequest,
    Transaction,
    Payment,
    Employee,
    SalaryDisbursement,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Bank => "bank",
            Entity::BankUser => "bank user",
            Entity::Client => "client",
            Entity::Beneficiary => "beneficiary",
            Entity::PaymentRequest => "payment request",
            Entity::Transaction => "transaction",
            Entity::Payment => "payment",
            Entity::Employee => "employee",
            Entity::SalaryDisbursement => "salary disbursement",
        };
        f.write_str(name)
    }
}

/// Approval state shared by payment requests, ledger transactions and disbursements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Status {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bank {
    pub id: BankId,
    pub name: String,
    pub abbreviation: String,
    pub is_active: bool,
}

/// Jurisdiction link: the user may resolve payment requests authorized by the bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankUser {
    pub id: Id,
    pub bank_id: BankId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: ClientId,
    pub bank_id: BankId,
    pub name: String,
    pub email: String,
    pub balance: Amount,
    pub is_active: bool,
    pub verification: VerificationStatus,
}

/// Input for [`Engine::register_client`](crate::Engine::register_client).
#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub bank_id: BankId,
    pub name: String,
    pub email: String,
    pub opening_balance: Amount,
}

/// Directed link from a client to a receiver it may pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Beneficiary {
    pub id: BeneficiaryId,
    pub name: String,
    pub client_id: ClientId,
    pub receiver_id: ClientId,
    pub is_active: bool,
}

/// A transfer intent awaiting resolution by a bank user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    pub id: PaymentRequestId,
    pub sender_id: ClientId,
    pub receiver_id: ClientId,
    pub authorizer_bank_id: BankId,
    pub amount: Amount,
    pub created_by: UserId,
    pub resolved: bool,
    pub status: Status,
}

impl PaymentRequest {
    /// Move to a terminal state. Callers check the request is still pending.
    pub fn resolve(&mut self, status: Status) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.resolved = true;
    }
}

/// A payment request together with its receiving client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequestDetail {
    pub request: PaymentRequest,
    pub receiver: Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionType {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaymentType {
    Transfer,
    Salary,
}

/// Append-only ledger entry against one client's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub client_id: ClientId,
    pub kind: TransactionType,
    pub payment_type: PaymentType,
    pub amount: Amount,
    pub status: Status,
}

impl Transaction {
    /// An approved entry, not yet stored (id is assigned on insert).
    pub fn approved(
        client_id: ClientId,
        kind: TransactionType,
        payment_type: PaymentType,
        amount: Amount,
    ) -> Self {
        Self {
            id: 0,
            client_id,
            kind,
            payment_type,
            amount,
            status: Status::Approved,
        }
    }
}

/// Durable proof that an approved transfer was executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub request_id: PaymentRequestId,
    pub sender_id: ClientId,
    pub receiver_id: ClientId,
    pub authorized_bank_id: BankId,
    pub credit_transaction_id: TransactionId,
    pub debit_transaction_id: TransactionId,
    pub amount: Amount,
    pub created_by: UserId,
    pub approved_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub client_id: ClientId,
    pub account_no: String,
    pub salary: Amount,
    pub total_salary_received: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalaryDisbursement {
    pub id: DisbursementId,
    pub client_id: ClientId,
    pub employee_id: EmployeeId,
    pub transaction_id: TransactionId,
    pub amount: Amount,
    pub status: Status,
    pub created_by: UserId,
}

/// A mutating engine operation, as replayed by [`Engine::run`](crate::Engine::run).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RegisterBank {
        name: String,
        abbreviation: String,
    },
    RegisterClient(NewClient),
    AssignBankUser {
        bank: BankId,
        user: UserId,
    },
    CreateBeneficiary {
        client: ClientId,
        receiver: ClientId,
        name: String,
    },
    DeleteBeneficiary {
        client: ClientId,
        beneficiary: BeneficiaryId,
    },
    RequestPayment {
        client: ClientId,
        user: UserId,
        beneficiary: BeneficiaryId,
        amount: Amount,
    },
    ApprovePayment {
        request: PaymentRequestId,
        user: UserId,
    },
    RejectPayment {
        request: PaymentRequestId,
        user: UserId,
    },
    AddEmployee {
        client: ClientId,
        account_no: String,
        salary: Amount,
    },
    /// Pay one employee, or every employee of the client when `employee` is `None`.
    DisburseSalary {
        client: ClientId,
        user: UserId,
        employee: Option<EmployeeId>,
    },
    VerifyClient {
        client: ClientId,
        user: UserId,
        status: VerificationStatus,
    },
}

impl Command {
    /// Short operation name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::RegisterBank { .. } => "register bank",
            Command::RegisterClient(_) => "register client",
            Command::AssignBankUser { .. } => "assign bank user",
            Command::CreateBeneficiary { .. } => "create beneficiary",
            Command::DeleteBeneficiary { .. } => "delete beneficiary",
            Command::RequestPayment { .. } => "payment request",
            Command::ApprovePayment { .. } => "approval",
            Command::RejectPayment { .. } => "rejection",
            Command::AddEmployee { .. } => "add employee",
            Command::DisburseSalary { .. } => "salary disbursement",
            Command::VerifyClient { .. } => "client verification",
        }
    }
}
