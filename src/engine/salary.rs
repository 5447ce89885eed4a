//! Employees and salary disbursement.
//!
//! Salary payments reuse the ledger primitives of the approval engine: every
//! disbursement is a debit transaction against the paying client plus an
//! append-only disbursement record, written in one unit of work.

use tracing::info;

use super::{Engine, EngineError, fetch};
use crate::Amount;
use crate::model::{
    Client, ClientId, Employee, EmployeeId, Entity, PaymentType, SalaryDisbursement, Status,
    Transaction, TransactionType, UserId,
};
use crate::store::UnitOfWork;

impl Engine {
    /// Register an employee paid by `client`. Account numbers are unique across clients.
    pub async fn add_employee(
        &self,
        client: ClientId,
        account_no: &str,
        salary: Amount,
    ) -> Result<Employee, EngineError> {
        if !salary.is_positive() {
            return Err(EngineError::InvalidAmount(salary));
        }

        let mut uow = self.store.begin().await;
        fetch::<Client>(&uow, client)?;
        if uow
            .first::<Employee>(|e| e.account_no == account_no)
            .is_some()
        {
            return Err(EngineError::DuplicateEmployee(account_no.to_string()));
        }

        let employee = uow.insert(Employee {
            id: 0,
            client_id: client,
            account_no: account_no.to_string(),
            salary,
            total_salary_received: Amount::ZERO,
        })?;
        uow.commit()?;

        info!(employee = employee.id, client, salary = %salary, "employee added");
        Ok(employee)
    }

    pub async fn employees(&self, client: ClientId) -> Result<Vec<Employee>, EngineError> {
        let uow = self.store.begin().await;
        fetch::<Client>(&uow, client)?;
        Ok(uow.select(|e: &Employee| e.client_id == client))
    }

    /// Remove an employee that has never been paid.
    pub async fn remove_employee(
        &self,
        client: ClientId,
        employee: EmployeeId,
    ) -> Result<Employee, EngineError> {
        let mut uow = self.store.begin().await;
        owned_employee(&uow, client, employee)?;
        if uow
            .first::<SalaryDisbursement>(|d| d.employee_id == employee)
            .is_some()
        {
            return Err(EngineError::EmployeeHasDisbursements(employee));
        }

        let removed = uow.delete::<Employee>(employee)?;
        uow.commit()?;

        info!(employee, client, "employee removed");
        Ok(removed)
    }

    /// Pay one month of salary to a single employee of `client`.
    pub async fn disburse_salary(
        &self,
        client: ClientId,
        employee: EmployeeId,
        user: UserId,
    ) -> Result<SalaryDisbursement, EngineError> {
        let mut uow = self.store.begin().await;
        let mut payer: Client = fetch(&uow, client)?;
        let employee = owned_employee(&uow, client, employee)?;
        ensure_covered(&payer, employee.salary)?;

        let disbursement = pay(&mut uow, &mut payer, employee, user)?;
        uow.commit()?;

        info!(
            disbursement = disbursement.id,
            client,
            employee = disbursement.employee_id,
            amount = %disbursement.amount,
            "salary disbursed"
        );
        Ok(disbursement)
    }

    /// Pay every employee of `client`. Either all of them are paid or none is.
    pub async fn disburse_all_salaries(
        &self,
        client: ClientId,
        user: UserId,
    ) -> Result<Vec<SalaryDisbursement>, EngineError> {
        let mut uow = self.store.begin().await;
        let mut payer: Client = fetch(&uow, client)?;
        let staff = uow.select(|e: &Employee| e.client_id == client);
        let total = Amount::checked_sum(staff.iter().map(|e| e.salary))
            .ok_or(EngineError::Overflow(Entity::Client, client))?;
        ensure_covered(&payer, total)?;

        let disbursements = staff
            .into_iter()
            .map(|employee| pay(&mut uow, &mut payer, employee, user))
            .collect::<Result<Vec<_>, _>>()?;
        uow.commit()?;

        info!(
            client,
            employees = disbursements.len(),
            total = %total,
            "salaries disbursed"
        );
        Ok(disbursements)
    }
}

/// An employee of `client`; employees of other clients are reported as missing.
fn owned_employee(
    uow: &UnitOfWork<'_>,
    client: ClientId,
    employee: EmployeeId,
) -> Result<Employee, EngineError> {
    fetch::<Client>(uow, client)?;
    uow.get::<Employee>(employee)
        .filter(|e| e.client_id == client)
        .ok_or(EngineError::NotFound(Entity::Employee, employee))
}

fn ensure_covered(payer: &Client, amount: Amount) -> Result<(), EngineError> {
    if payer.balance < amount {
        return Err(EngineError::InsufficientBalance {
            client: payer.id,
            available: payer.balance,
            requested: amount,
        });
    }
    Ok(())
}

/// Debit `payer` by the employee's salary and record the disbursement.
/// Both running totals are checked before anything is written.
fn pay(
    uow: &mut UnitOfWork<'_>,
    payer: &mut Client,
    mut employee: Employee,
    user: UserId,
) -> Result<SalaryDisbursement, EngineError> {
    let amount = employee.salary;
    payer.balance = payer
        .balance
        .checked_sub(amount)
        .ok_or(EngineError::Overflow(Entity::Client, payer.id))?;
    employee.total_salary_received = employee
        .total_salary_received
        .checked_add(amount)
        .ok_or(EngineError::Overflow(Entity::Employee, employee.id))?;

    let debit = uow.insert(Transaction::approved(
        payer.id,
        TransactionType::Debit,
        PaymentType::Salary,
        amount,
    ))?;
    uow.update(&*payer)?;
    uow.update(&employee)?;

    let disbursement = uow.insert(SalaryDisbursement {
        id: 0,
        client_id: payer.id,
        employee_id: employee.id,
        transaction_id: debit.id,
        amount,
        status: Status::Approved,
        created_by: user,
    })?;
    Ok(disbursement)
}
