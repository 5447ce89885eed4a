use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::Amount;
use crate::model::{
    BankId, Client, ClientId, Command, Id, NewClient, UserId, VerificationStatus,
};

/// Errors that can occur when reading a command script
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {}: {source}", .path.display())]
    Open { path: PathBuf, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized op '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing {field}")]
    MissingField {
        line: usize,
        op: &'static str,
        field: &'static str,
    },

    #[error("line {line}: {op} amount {value} is out of range")]
    InvalidAmount {
        line: usize,
        op: &'static str,
        value: f64,
    },

    #[error("line {line}: unrecognized verification status '{status}'")]
    UnrecognizedStatus { line: usize, status: String },
}

/// One script row. Which columns are required depends on `op`:
///
/// | op          | columns                                   |
/// |-------------|-------------------------------------------|
/// | bank        | name                                      |
/// | client      | bank, name, email, amount (opening)       |
/// | bank_user   | bank, user                                |
/// | beneficiary | client, target (receiver), name           |
/// | unlink      | client, target (beneficiary)              |
/// | request     | client, user, target (beneficiary), amount|
/// | approve     | target (request), user                    |
/// | reject      | target (request), user                    |
/// | employee    | client, name (account number), amount     |
/// | salary      | client, user, target (employee, optional) |
/// | verify      | client, user, name (status)               |
#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    bank: Option<BankId>,
    client: Option<ClientId>,
    user: Option<UserId>,
    target: Option<Id>,
    amount: Option<f64>,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    client: ClientId,
    bank: BankId,
    balance: String,
}

struct Fields {
    line: usize,
    op: &'static str,
    row: InputRow,
}

impl Fields {
    fn require<T>(&self, value: Option<T>, field: &'static str) -> Result<T, CsvError> {
        value.ok_or(CsvError::MissingField {
            line: self.line,
            op: self.op,
            field,
        })
    }

    fn bank(&self) -> Result<BankId, CsvError> {
        self.require(self.row.bank, "bank")
    }

    fn client(&self) -> Result<ClientId, CsvError> {
        self.require(self.row.client, "client")
    }

    fn user(&self) -> Result<UserId, CsvError> {
        self.require(self.row.user, "user")
    }

    fn target(&self) -> Result<Id, CsvError> {
        self.require(self.row.target, "target")
    }

    fn amount(&self) -> Result<Amount, CsvError> {
        let value = self.require(self.row.amount, "amount")?;
        Amount::try_from_float(value).ok_or(CsvError::InvalidAmount {
            line: self.line,
            op: self.op,
            value,
        })
    }

    fn status(&self) -> Result<VerificationStatus, CsvError> {
        let status = self.require(self.row.name.as_deref(), "name")?;
        match status.to_ascii_lowercase().as_str() {
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "rejected" => Ok(VerificationStatus::Rejected),
            _ => Err(CsvError::UnrecognizedStatus {
                line: self.line,
                status: status.to_string(),
            }),
        }
    }

    fn name(&self) -> Result<String, CsvError> {
        self.require(self.row.name.clone(), "name")
    }

    fn email(&self) -> Result<String, CsvError> {
        self.require(self.row.email.clone(), "email")
    }
}

/// Read ledger commands from a csv script. The returned iterator owns the
/// open file and does not borrow `path`.
pub fn read_commands(
    path: &Path,
) -> Result<impl Iterator<Item = Result<Command, CsvError>> + use<>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            parse_command(line, row)
        }))
}

fn parse_command(line: usize, row: InputRow) -> Result<Command, CsvError> {
    let op = match row.op.as_str() {
        "bank" => "bank",
        "client" => "client",
        "bank_user" => "bank_user",
        "beneficiary" => "beneficiary",
        "unlink" => "unlink",
        "request" => "request",
        "approve" => "approve",
        "reject" => "reject",
        "employee" => "employee",
        "salary" => "salary",
        "verify" => "verify",
        other => {
            return Err(CsvError::UnrecognizedOp {
                line,
                op: other.to_string(),
            });
        }
    };
    let f = Fields { line, op, row };

    let command = match op {
        "bank" => {
            let name = f.name()?;
            Command::RegisterBank {
                abbreviation: abbreviate(&name),
                name,
            }
        }
        "client" => Command::RegisterClient(NewClient {
            bank_id: f.bank()?,
            name: f.name()?,
            email: f.email()?,
            opening_balance: f.amount()?,
        }),
        "bank_user" => Command::AssignBankUser {
            bank: f.bank()?,
            user: f.user()?,
        },
        "beneficiary" => Command::CreateBeneficiary {
            client: f.client()?,
            receiver: f.target()?,
            name: f.name()?,
        },
        "unlink" => Command::DeleteBeneficiary {
            client: f.client()?,
            beneficiary: f.target()?,
        },
        "request" => Command::RequestPayment {
            client: f.client()?,
            user: f.user()?,
            beneficiary: f.target()?,
            amount: f.amount()?,
        },
        "approve" => Command::ApprovePayment {
            request: f.target()?,
            user: f.user()?,
        },
        "reject" => Command::RejectPayment {
            request: f.target()?,
            user: f.user()?,
        },
        "employee" => Command::AddEmployee {
            client: f.client()?,
            account_no: f.name()?,
            salary: f.amount()?,
        },
        "salary" => Command::DisburseSalary {
            client: f.client()?,
            user: f.user()?,
            employee: f.row.target,
        },
        _ => Command::VerifyClient {
            client: f.client()?,
            user: f.user()?,
            status: f.status()?,
        },
    };
    Ok(command)
}

/// Initials of each word, e.g. "First National Bank" becomes "FNB".
fn abbreviate(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Write client balances in csv format, in the order given
pub fn write_balances(
    writer: impl io::Write,
    clients: impl IntoIterator<Item = Client>,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    for client in clients {
        writer.serialize(OutputRow {
            client: client.id,
            bank: client.bank_id,
            balance: client.balance.to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}
