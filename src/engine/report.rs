//! Read-only aggregates over the ledger.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{Engine, EngineError, fetch};
use crate::Amount;
use crate::model::{
    Client, ClientId, Employee, EmployeeId, Entity, PaymentRequest, Status, Transaction,
};

/// Money exchanged with one counterparty, through approved requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterpartyTotals {
    pub client_id: ClientId,
    /// Paid by the counterparty to the reported client.
    pub sent_to_client: Amount,
    /// Paid by the reported client to the counterparty.
    pub received_from_client: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentReport {
    pub client_id: ClientId,
    pub total_payments_sent: usize,
    pub total_payments_received: usize,
    pub total_sent_value: Amount,
    pub total_received_value: Amount,
    /// Requests created by the client, in any state.
    pub total_requests: usize,
    pub approved_requests: usize,
    pub rejected_requests: usize,
    pub average_payment_value: Amount,
    pub counterparties: BTreeMap<ClientId, CounterpartyTotals>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeePayment {
    pub employee_id: EmployeeId,
    pub salary_disbursed: Amount,
    pub monthly_salary: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalaryReport {
    pub client_id: ClientId,
    pub client_name: String,
    pub total_employees: usize,
    pub total_salary_disbursed: Amount,
    pub expected_monthly_disbursal: Amount,
    pub average_salary: Amount,
    pub employees: Vec<EmployeePayment>,
}

impl PaymentReport {
    fn record(&mut self, request: &PaymentRequest) -> Result<(), EngineError> {
        let client = self.client_id;
        let sent = request.sender_id == client;
        let approved = request.status == Status::Approved;

        if sent && approved {
            let counterparty = self.counterparty(request.receiver_id);
            accumulate(&mut counterparty.received_from_client, request.amount, client)?;
            accumulate(&mut self.total_sent_value, request.amount, client)?;
            self.total_payments_sent += 1;
        } else if approved {
            let counterparty = self.counterparty(request.sender_id);
            accumulate(&mut counterparty.sent_to_client, request.amount, client)?;
            accumulate(&mut self.total_received_value, request.amount, client)?;
            self.total_payments_received += 1;
        }

        if sent {
            self.total_requests += 1;
            match request.status {
                Status::Approved => self.approved_requests += 1,
                Status::Rejected => self.rejected_requests += 1,
                Status::Pending => {}
            }
        }
        Ok(())
    }

    fn counterparty(&mut self, client_id: ClientId) -> &mut CounterpartyTotals {
        self.counterparties
            .entry(client_id)
            .or_insert_with(|| CounterpartyTotals {
                client_id,
                ..Default::default()
            })
    }
}

fn accumulate(total: &mut Amount, amount: Amount, client: ClientId) -> Result<(), EngineError> {
    *total = total
        .checked_add(amount)
        .ok_or(EngineError::Overflow(Entity::Client, client))?;
    Ok(())
}

impl Engine {
    /// Every ledger entry of `client`, oldest first.
    pub async fn transaction_report(&self, client: ClientId) -> Result<Vec<Transaction>, EngineError> {
        let uow = self.store.begin().await;
        fetch::<Client>(&uow, client)?;
        Ok(uow.select(|t: &Transaction| t.client_id == client))
    }

    /// Payment activity of `client`, as sender and as receiver.
    pub async fn payment_report(&self, client: ClientId) -> Result<PaymentReport, EngineError> {
        let uow = self.store.begin().await;
        fetch::<Client>(&uow, client)?;

        let mut report = PaymentReport {
            client_id: client,
            ..Default::default()
        };
        for request in uow.select(|r: &PaymentRequest| r.sender_id == client || r.receiver_id == client) {
            report.record(&request)?;
        }
        report.average_payment_value = report.total_sent_value.mean(report.total_payments_sent);
        Ok(report)
    }

    pub async fn salary_report(&self, client: ClientId) -> Result<SalaryReport, EngineError> {
        let uow = self.store.begin().await;
        let payer: Client = fetch(&uow, client)?;
        let staff = uow.select(|e: &Employee| e.client_id == client);

        let total = |amounts: Vec<Amount>| {
            Amount::checked_sum(amounts).ok_or(EngineError::Overflow(Entity::Client, client))
        };
        let expected = total(staff.iter().map(|e| e.salary).collect())?;
        let disbursed = total(staff.iter().map(|e| e.total_salary_received).collect())?;
        Ok(SalaryReport {
            client_id: client,
            client_name: payer.name,
            total_employees: staff.len(),
            total_salary_disbursed: disbursed,
            expected_monthly_disbursal: expected,
            average_salary: expected.mean(staff.len()),
            employees: staff
                .iter()
                .map(|e| EmployeePayment {
                    employee_id: e.id,
                    salary_disbursed: e.total_salary_received,
                    monthly_salary: e.salary,
                })
                .collect(),
        })
    }
}
