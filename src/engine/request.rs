//! Payment requests: pending transfer intents created by clients.

use tracing::info;

use super::{Engine, EngineError, fetch};
use crate::Amount;
use crate::model::{
    Beneficiary, BeneficiaryId, Client, ClientId, Entity, Payment, PaymentRequest,
    PaymentRequestDetail, PaymentRequestId, Status, UserId,
};

impl Engine {
    /// Record an intent by `sender` to pay the receiver of `beneficiary`.
    ///
    /// The balance is checked but not held; approval checks it again.
    pub async fn create_payment_request(
        &self,
        sender: ClientId,
        created_by: UserId,
        amount: Amount,
        beneficiary: BeneficiaryId,
    ) -> Result<PaymentRequest, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(amount));
        }

        let mut uow = self.store.begin().await;
        let client: Client = fetch(&uow, sender)?;
        if client.balance < amount {
            return Err(EngineError::InsufficientBalance {
                client: sender,
                available: client.balance,
                requested: amount,
            });
        }

        let link = uow
            .first::<Beneficiary>(|b| b.id == beneficiary && b.client_id == sender && b.is_active)
            .ok_or(EngineError::NotFound(Entity::Beneficiary, beneficiary))?;

        let request = uow.insert(PaymentRequest {
            id: 0,
            sender_id: sender,
            receiver_id: link.receiver_id,
            authorizer_bank_id: client.bank_id,
            amount,
            created_by,
            resolved: false,
            status: Status::Pending,
        })?;
        uow.commit()?;

        info!(
            request = request.id,
            sender,
            receiver = request.receiver_id,
            amount = %amount,
            "payment request created"
        );
        Ok(request)
    }

    /// Every payment request sent by `client`, with its receiver.
    pub async fn list_payment_requests(
        &self,
        client: ClientId,
    ) -> Result<Vec<PaymentRequestDetail>, EngineError> {
        let uow = self.store.begin().await;
        fetch::<Client>(&uow, client)?;

        uow.select(|r: &PaymentRequest| r.sender_id == client)
            .into_iter()
            .map(|request| -> Result<_, EngineError> {
                let receiver = fetch(&uow, request.receiver_id)?;
                Ok(PaymentRequestDetail { request, receiver })
            })
            .collect()
    }

    pub async fn payment_request(&self, id: PaymentRequestId) -> Result<PaymentRequest, EngineError> {
        let uow = self.store.begin().await;
        fetch(&uow, id)
    }

    /// Executed payments sent by `client`.
    pub async fn payments(&self, client: ClientId) -> Result<Vec<Payment>, EngineError> {
        let uow = self.store.begin().await;
        fetch::<Client>(&uow, client)?;
        Ok(uow.select(|p: &Payment| p.sender_id == client))
    }
}
