//! Payment approval state machine.
//!
//! A payment request moves `Pending -> Approved` or `Pending -> Rejected`
//! exactly once. Approval materializes the transfer inside a single unit of
//! work, in this order:
//!
//! 1. load the request, check the approver's jurisdiction and that it is pending
//! 2. re-read both clients, check the sender's balance covers the amount and
//!    the receiver's balance can take it
//! 3. debit transaction, sender balance
//! 4. credit transaction, receiver balance
//! 5. payment record linking both transactions
//! 6. request marked approved and resolved
//!
//! Any failure rolls back every earlier write. The sender is notified only
//! after the commit.

use tracing::info;

use super::{Engine, EngineError, authorize, fetch};
use crate::model::{
    Client, Entity, Payment, PaymentRequest, PaymentRequestId, PaymentType, Status, Transaction,
    TransactionType, UserId,
};
use crate::notify::Email;

impl Engine {
    /// Execute a pending payment request on behalf of bank user `approver`.
    pub async fn approve_payment_request(
        &self,
        request_id: PaymentRequestId,
        approver: UserId,
    ) -> Result<Payment, EngineError> {
        let mut uow = self.store.begin().await;

        let mut request: PaymentRequest = fetch(&uow, request_id)?;
        authorize(&uow, approver, request.authorizer_bank_id)?;
        ensure_pending(&request)?;

        // the balance may have changed since the request was created
        let mut sender: Client = fetch(&uow, request.sender_id)?;
        let mut receiver: Client = fetch(&uow, request.receiver_id)?;
        let amount = request.amount;
        if sender.balance < amount {
            return Err(EngineError::InsufficientBalance {
                client: sender.id,
                available: sender.balance,
                requested: amount,
            });
        }
        sender.balance = sender
            .balance
            .checked_sub(amount)
            .ok_or(EngineError::Overflow(Entity::Client, sender.id))?;
        receiver.balance = receiver
            .balance
            .checked_add(amount)
            .ok_or(EngineError::Overflow(Entity::Client, receiver.id))?;

        let debit = uow.insert(Transaction::approved(
            sender.id,
            TransactionType::Debit,
            PaymentType::Transfer,
            amount,
        ))?;
        uow.update(&sender)?;

        let credit = uow.insert(Transaction::approved(
            receiver.id,
            TransactionType::Credit,
            PaymentType::Transfer,
            amount,
        ))?;
        uow.update(&receiver)?;

        let payment = uow.insert(Payment {
            id: 0,
            request_id: request.id,
            sender_id: sender.id,
            receiver_id: receiver.id,
            authorized_bank_id: request.authorizer_bank_id,
            credit_transaction_id: credit.id,
            debit_transaction_id: debit.id,
            amount,
            created_by: request.created_by,
            approved_by: approver,
        })?;

        request.resolve(Status::Approved);
        uow.update(&request)?;
        uow.commit()?;

        info!(
            request = request_id,
            payment = payment.id,
            sender = sender.id,
            receiver = receiver.id,
            amount = %amount,
            approver,
            "payment approved"
        );

        self.notifications.notify(Email::new(
            sender.email,
            "Payment Approved",
            format!("Your payment with id:{request_id} has been approved"),
        ));
        Ok(payment)
    }

    /// Decline a pending payment request. No money moves.
    pub async fn reject_payment_request(
        &self,
        request_id: PaymentRequestId,
        rejecter: UserId,
    ) -> Result<PaymentRequest, EngineError> {
        let mut uow = self.store.begin().await;

        let mut request: PaymentRequest = fetch(&uow, request_id)?;
        authorize(&uow, rejecter, request.authorizer_bank_id)?;
        ensure_pending(&request)?;

        request.resolve(Status::Rejected);
        uow.update(&request)?;
        uow.commit()?;

        info!(request = request_id, rejecter, "payment rejected");
        Ok(request)
    }
}

fn ensure_pending(request: &PaymentRequest) -> Result<(), EngineError> {
    if request.status.is_terminal() || request.resolved {
        return Err(EngineError::AlreadyResolved {
            request: request.id,
            status: request.status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{new_client, two_clients};
    use super::*;
    use crate::Amount;
    use crate::model::{NewClient, VerificationStatus};
    use crate::notify::NotificationSink;
    use crate::notify::testing::{Recorder, Unreachable};
    use crate::store::{Fault, WriteOp};

    const BANK_USER: UserId = 10;

    /// Two clients with 1000 each, a beneficiary link and a pending request from a to b.
    async fn pending(engine: &Engine, amount: i64) -> (Client, Client, PaymentRequest) {
        let (a, b) = two_clients(engine).await;
        let link = engine.create_beneficiary(a.id, b.id, "Bob").await.unwrap();
        let request = engine
            .create_payment_request(a.id, 20, Amount::from_units(amount), link.id)
            .await
            .unwrap();
        (a, b, request)
    }

    async fn ledger_rows(engine: &Engine) -> (Vec<Transaction>, Vec<Payment>) {
        let uow = engine.store.begin().await;
        (
            uow.select(|_: &Transaction| true),
            uow.select(|_: &Payment| true),
        )
    }

    #[tokio::test]
    async fn approval_moves_money_and_records_ledger() {
        let engine = Engine::default();
        let (a, b, request) = pending(&engine, 300).await;

        let payment = engine
            .approve_payment_request(request.id, BANK_USER)
            .await
            .unwrap();

        assert_eq!(engine.client(a.id).await.unwrap().balance, Amount::from_units(700));
        assert_eq!(engine.client(b.id).await.unwrap().balance, Amount::from_units(1300));

        let (transactions, payments) = ledger_rows(&engine).await;
        assert_eq!(transactions.len(), 2);
        let debit = &transactions[0];
        let credit = &transactions[1];
        assert_eq!(
            (debit.client_id, debit.kind, debit.amount, debit.status),
            (a.id, TransactionType::Debit, Amount::from_units(300), Status::Approved)
        );
        assert_eq!(
            (credit.client_id, credit.kind, credit.amount, credit.status),
            (b.id, TransactionType::Credit, Amount::from_units(300), Status::Approved)
        );

        assert_eq!(payments, vec![payment.clone()]);
        assert_eq!(payment.debit_transaction_id, debit.id);
        assert_eq!(payment.credit_transaction_id, credit.id);
        assert_eq!(payment.request_id, request.id);
        assert_eq!(payment.created_by, 20);
        assert_eq!(payment.approved_by, BANK_USER);
        assert_eq!(payment.authorized_bank_id, a.bank_id);

        let resolved = engine.payment_request(request.id).await.unwrap();
        assert_eq!(resolved.status, Status::Approved);
        assert!(resolved.resolved);
    }

    #[tokio::test]
    async fn approval_conserves_total_balance() {
        let engine = Engine::default();
        let (_, _, request) = pending(&engine, 250).await;
        let before = engine.total_balance().await.unwrap();

        engine
            .approve_payment_request(request.id, BANK_USER)
            .await
            .unwrap();

        assert_eq!(engine.total_balance().await, Some(before));
    }

    #[tokio::test]
    async fn rejection_only_resolves_request() {
        let engine = Engine::default();
        let (a, b, request) = pending(&engine, 300).await;

        let rejected = engine
            .reject_payment_request(request.id, BANK_USER)
            .await
            .unwrap();
        assert_eq!(rejected.status, Status::Rejected);
        assert!(rejected.resolved);

        assert_eq!(engine.client(a.id).await.unwrap().balance, a.balance);
        assert_eq!(engine.client(b.id).await.unwrap().balance, b.balance);
        let (transactions, payments) = ledger_rows(&engine).await;
        assert!(transactions.is_empty());
        assert!(payments.is_empty());
    }

    #[tokio::test]
    async fn unknown_request_fails() {
        let engine = Engine::default();
        two_clients(&engine).await;

        let result = engine.approve_payment_request(42, BANK_USER).await;
        assert!(matches!(
            result,
            Err(EngineError::NotFound(Entity::PaymentRequest, 42))
        ));
        let result = engine.reject_payment_request(42, BANK_USER).await;
        assert!(matches!(
            result,
            Err(EngineError::NotFound(Entity::PaymentRequest, 42))
        ));
    }

    #[tokio::test]
    async fn bank_user_of_another_bank_is_unauthorized() {
        let engine = Engine::default();
        let (a, b, request) = pending(&engine, 300).await;
        let other = engine.register_bank("Second Bank", "SB").await.unwrap();
        engine.assign_bank_user(other.id, 11).await.unwrap();

        let result = engine.approve_payment_request(request.id, 11).await;
        assert!(matches!(
            result,
            Err(EngineError::Unauthorized { user: 11, bank }) if bank == a.bank_id
        ));
        let result = engine.reject_payment_request(request.id, 11).await;
        assert!(matches!(result, Err(EngineError::Unauthorized { .. })));

        assert_eq!(engine.client(a.id).await.unwrap().balance, a.balance);
        assert_eq!(engine.client(b.id).await.unwrap().balance, b.balance);
        assert_eq!(
            engine.payment_request(request.id).await.unwrap().status,
            Status::Pending
        );
        let (transactions, payments) = ledger_rows(&engine).await;
        assert!(transactions.is_empty() && payments.is_empty());
    }

    #[tokio::test]
    async fn balance_is_rechecked_at_approval() {
        let engine = Engine::default();
        let (a, b) = two_clients(&engine).await;
        let c = engine
            .register_client(new_client(a.bank_id, "carol"))
            .await
            .unwrap();
        let to_b = engine.create_beneficiary(a.id, b.id, "Bob").await.unwrap();
        let to_c = engine.create_beneficiary(a.id, c.id, "Carol").await.unwrap();

        // both requests fit the balance at creation time, not together
        let first = engine
            .create_payment_request(a.id, 20, Amount::from_units(900), to_c.id)
            .await
            .unwrap();
        let second = engine
            .create_payment_request(a.id, 20, Amount::from_units(150), to_b.id)
            .await
            .unwrap();

        engine
            .approve_payment_request(first.id, BANK_USER)
            .await
            .unwrap();
        let result = engine.approve_payment_request(second.id, BANK_USER).await;
        assert!(matches!(
            result,
            Err(EngineError::InsufficientBalance { client, available, requested })
                if client == a.id
                    && available == Amount::from_units(100)
                    && requested == Amount::from_units(150)
        ));

        assert_eq!(engine.client(a.id).await.unwrap().balance, Amount::from_units(100));
        assert_eq!(engine.client(b.id).await.unwrap().balance, Amount::from_units(1000));
        let still_pending = engine.payment_request(second.id).await.unwrap();
        assert_eq!(still_pending.status, Status::Pending);
        assert!(!still_pending.resolved);
    }

    #[tokio::test]
    async fn credit_past_the_amount_range_changes_nothing() {
        let engine = Engine::default();
        let (a, _) = two_clients(&engine).await;
        let rich = engine
            .register_client(NewClient {
                opening_balance: Amount::from_scaled(i64::MAX - 1),
                ..new_client(a.bank_id, "rich")
            })
            .await
            .unwrap();
        let link = engine.create_beneficiary(a.id, rich.id, "Rich").await.unwrap();
        let request = engine
            .create_payment_request(a.id, 20, Amount::from_units(1000), link.id)
            .await
            .unwrap();

        let result = engine.approve_payment_request(request.id, BANK_USER).await;
        assert!(matches!(
            result,
            Err(EngineError::Overflow(Entity::Client, id)) if id == rich.id
        ));

        assert_eq!(engine.client(a.id).await.unwrap().balance, a.balance);
        assert_eq!(engine.client(rich.id).await.unwrap().balance, rich.balance);
        let (transactions, payments) = ledger_rows(&engine).await;
        assert!(transactions.is_empty());
        assert!(payments.is_empty());
        assert_eq!(engine.payment_request(request.id).await.unwrap(), request);
    }

    #[tokio::test]
    async fn terminal_requests_cannot_be_resolved_again() {
        let engine = Engine::default();
        let (a, _, approved) = pending(&engine, 100).await;
        engine
            .approve_payment_request(approved.id, BANK_USER)
            .await
            .unwrap();

        let link = engine.list_beneficiaries(a.id).await.unwrap()[0].id;
        let rejected = engine
            .create_payment_request(a.id, 20, Amount::from_units(100), link)
            .await
            .unwrap();
        engine
            .reject_payment_request(rejected.id, BANK_USER)
            .await
            .unwrap();

        let balances_before = engine.clients().await;
        for id in [approved.id, rejected.id] {
            let again = engine.approve_payment_request(id, BANK_USER).await;
            assert!(matches!(again, Err(EngineError::AlreadyResolved { request, .. }) if request == id));
            let again = engine.reject_payment_request(id, BANK_USER).await;
            assert!(matches!(again, Err(EngineError::AlreadyResolved { .. })));
        }

        assert_eq!(engine.clients().await, balances_before);
        let (transactions, payments) = ledger_rows(&engine).await;
        assert_eq!(transactions.len(), 2);
        assert_eq!(payments.len(), 1);
        assert_eq!(
            engine.payment_request(rejected.id).await.unwrap().status,
            Status::Rejected
        );
    }

    #[tokio::test]
    async fn failure_at_any_step_leaves_no_trace() {
        let steps = [
            Fault::on(Entity::Transaction, WriteOp::Insert),
            Fault::on(Entity::Client, WriteOp::Update),
            Fault::on(Entity::Transaction, WriteOp::Insert).after(1),
            Fault::on(Entity::Client, WriteOp::Update).after(1),
            Fault::on(Entity::Payment, WriteOp::Insert),
            Fault::on(Entity::PaymentRequest, WriteOp::Update),
            Fault::on_commit(),
        ];

        for fault in steps {
            let engine = Engine::default();
            let (a, b, request) = pending(&engine, 300).await;
            engine.store.inject_fault(fault).await;

            let result = engine.approve_payment_request(request.id, BANK_USER).await;
            assert!(
                matches!(result, Err(EngineError::Store(_))),
                "{fault:?} should abort the approval"
            );

            assert_eq!(engine.client(a.id).await.unwrap().balance, a.balance, "{fault:?}");
            assert_eq!(engine.client(b.id).await.unwrap().balance, b.balance, "{fault:?}");
            let (transactions, payments) = ledger_rows(&engine).await;
            assert!(transactions.is_empty(), "{fault:?}");
            assert!(payments.is_empty(), "{fault:?}");
            let unchanged = engine.payment_request(request.id).await.unwrap();
            assert_eq!(unchanged, request, "{fault:?}");

            // nothing was committed, so a retry starts over cleanly
            engine
                .approve_payment_request(request.id, BANK_USER)
                .await
                .unwrap();
            assert_eq!(engine.client(a.id).await.unwrap().balance, Amount::from_units(700));
            assert_eq!(engine.client(b.id).await.unwrap().balance, Amount::from_units(1300));
        }
    }

    #[tokio::test]
    async fn sender_is_notified_after_commit() {
        let recorder = Recorder::default();
        let (sink, worker) = NotificationSink::spawn(recorder.clone(), 8);
        let engine = Engine::new(sink);
        let (a, _, request) = pending(&engine, 300).await;

        engine
            .approve_payment_request(request.id, BANK_USER)
            .await
            .unwrap();
        drop(engine);
        worker.await.unwrap();

        assert_eq!(
            recorder.sent(),
            vec![Email::new(
                a.email,
                "Payment Approved",
                format!("Your payment with id:{} has been approved", request.id),
            )]
        );
    }

    #[tokio::test]
    async fn failed_approval_sends_nothing() {
        let recorder = Recorder::default();
        let (sink, worker) = NotificationSink::spawn(recorder.clone(), 8);
        let engine = Engine::new(sink);
        let (_, _, request) = pending(&engine, 300).await;

        let result = engine.approve_payment_request(request.id, 99).await;
        assert!(result.is_err());
        drop(engine);
        worker.await.unwrap();

        assert!(recorder.sent().is_empty());
    }

    #[tokio::test]
    async fn notification_failure_does_not_affect_approval() {
        let (sink, worker) = NotificationSink::spawn(Unreachable, 8);
        let engine = Engine::new(sink);
        let (a, _, request) = pending(&engine, 300).await;

        engine
            .approve_payment_request(request.id, BANK_USER)
            .await
            .unwrap();
        assert_eq!(engine.client(a.id).await.unwrap().balance, Amount::from_units(700));
        assert_eq!(
            engine.payment_request(request.id).await.unwrap().status,
            Status::Approved
        );

        drop(engine);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn approval_ignores_client_verification() {
        let engine = Engine::default();
        let (a, _, request) = pending(&engine, 300).await;
        assert_eq!(a.verification, VerificationStatus::Pending);

        engine
            .approve_payment_request(request.id, BANK_USER)
            .await
            .unwrap();
    }
}
