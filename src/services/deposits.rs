//! Wallet deposits.
//!
//! A deposit is recorded `pending` before the customer is sent to the hosted
//! payment page. The gateway's callback settles it: a success callback is
//! checked against the validation API and must match the recorded amount, a
//! fail or cancel callback marks it failed. Settlement is a compare-and-set on
//! the pending status, so a replayed callback is reported but never credits
//! the wallet twice.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::Config;
use crate::domain::aggregates::deposit::parse_transaction_reference;
use crate::domain::aggregates::{Deposit, DepositOutcome, User};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Money;
use crate::repository::{Repository, Settlement};
use crate::services::payments::{PaymentGateway, SessionRequest};
use crate::services::EventPublisher;
use crate::{Result, ShopError};

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Money,
}

#[derive(Debug, Serialize)]
pub struct DepositSession {
    pub deposit: Deposit,
    pub payment_url: String,
}

/// Which callback endpoint the gateway hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackKind {
    Success,
    Fail,
    Cancel,
}

/// Fields of the gateway's form-encoded callback that we use.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GatewayCallback {
    #[serde(default)]
    pub tran_id: String,
    pub val_id: Option<String>,
    pub amount: Option<String>,
    pub status: Option<String>,
}

#[instrument(skip(repo, gateway, config, user, request), fields(user_id = %user.id))]
pub async fn create_deposit(
    repo: &dyn Repository,
    gateway: &dyn PaymentGateway,
    config: &Config,
    user: &User,
    request: DepositRequest,
) -> Result<DepositSession> {
    if request.amount.is_zero() {
        return Err(ShopError::Validation("Deposit amount must be greater than zero".into()));
    }
    let deposit = repo.create_deposit(user.id, request.amount).await?;
    let callback = |kind: &str| format!("{}/api/v1/payment/{kind}", config.backend_url);
    let session = SessionRequest {
        tran_id: deposit.transaction_reference.clone(),
        amount: deposit.amount,
        currency: config.currency.clone(),
        customer_name: user.full_name(),
        customer_email: user.email.to_string(),
        customer_phone: user.phone_number.clone().unwrap_or_default(),
        customer_address: user.address.clone().unwrap_or_default(),
        success_url: callback("success"),
        fail_url: callback("fail"),
        cancel_url: callback("cancel"),
    };

    match gateway.create_session(&session).await {
        Ok(session) => {
            tracing::info!(deposit_id = %deposit.id, amount = %deposit.amount, "deposit session opened");
            Ok(DepositSession { deposit, payment_url: session.payment_url })
        }
        Err(e) => {
            tracing::warn!(deposit_id = %deposit.id, error = %e, "deposit session failed");
            repo.settle_deposit(deposit.id, DepositOutcome::Failed).await?;
            Err(e)
        }
    }
}

#[instrument(skip(repo, gateway, events, callback), fields(tran_id = %callback.tran_id))]
pub async fn settle_from_callback(
    repo: &dyn Repository,
    gateway: &dyn PaymentGateway,
    events: &EventPublisher,
    kind: CallbackKind,
    callback: GatewayCallback,
) -> Result<Settlement> {
    let deposit_id = parse_transaction_reference(&callback.tran_id)
        .ok_or_else(|| ShopError::Validation("Unknown transaction reference".into()))?;
    let deposit = repo.deposit(deposit_id).await?.ok_or(ShopError::NotFound("Deposit"))?;

    let outcome = match kind {
        CallbackKind::Success => {
            if !deposit.is_pending() {
                return Ok(Settlement { deposit, applied: false });
            }
            let val_id = callback
                .val_id
                .as_deref()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ShopError::Validation("Missing validation id".into()))?;
            let payment = gateway.validate(val_id).await?;
            if !payment.valid || payment.tran_id != deposit.transaction_reference {
                tracing::warn!(deposit_id = %deposit.id, "gateway did not confirm payment");
                return Err(ShopError::Validation("Payment could not be validated".into()));
            }
            if payment.amount != deposit.amount.amount() {
                tracing::warn!(deposit_id = %deposit.id, paid = %payment.amount, "paid amount does not match deposit");
                return Err(ShopError::Validation("Paid amount does not match the deposit".into()));
            }
            DepositOutcome::Completed
        }
        CallbackKind::Fail | CallbackKind::Cancel => DepositOutcome::Failed,
    };

    let settlement = repo.settle_deposit(deposit.id, outcome).await?;
    if settlement.applied {
        let d = &settlement.deposit;
        tracing::info!(deposit_id = %d.id, user_id = %d.user_id, status = %d.status, "deposit settled");
        events
            .publish(&DomainEvent::DepositSettled { deposit_id: d.id, user_id: d.user_id, amount: d.amount, status: d.status })
            .await;
    } else {
        tracing::info!(deposit_id = %settlement.deposit.id, status = %settlement.deposit.status, "deposit already settled");
    }
    Ok(settlement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{DepositStatus, NewUser, Role};
    use crate::domain::value_objects::Email;
    use crate::repository::MemoryRepository;
    use crate::services::payments::{PaymentSession, ValidatedPayment};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeGateway {
        fail_sessions: bool,
        paid: Option<Decimal>,
        validations: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession> {
            if self.fail_sessions {
                return Err(ShopError::Gateway("down".into()));
            }
            Ok(PaymentSession { payment_url: format!("https://pay.test/{}", request.tran_id) })
        }

        async fn validate(&self, val_id: &str) -> Result<ValidatedPayment> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            let (tran_id, _) = val_id.split_once(':').unwrap_or((val_id, ""));
            Ok(ValidatedPayment { tran_id: tran_id.into(), amount: self.paid.unwrap_or_default(), valid: true })
        }
    }

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "JWT_SECRET" => Some("0123456789abcdef0123456789abcdef".into()),
            _ => None,
        })
        .unwrap()
    }

    async fn buyer(repo: &MemoryRepository) -> User {
        repo.create_user(
            NewUser {
                email: Email::parse("wallet@example.com").unwrap(),
                password_hash: String::new(),
                first_name: "Wallet".into(),
                last_name: "Owner".into(),
                address: None,
                phone_number: None,
            },
            Role::Buyer,
        )
        .await
        .unwrap()
    }

    fn amount() -> Money { Money::new(Decimal::new(50000, 2)).unwrap() }

    fn success(deposit: &Deposit) -> GatewayCallback {
        GatewayCallback {
            tran_id: deposit.transaction_reference.clone(),
            val_id: Some(format!("{}:val", deposit.transaction_reference)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_success_callback_credits_once() {
        let repo = MemoryRepository::new();
        let gateway = FakeGateway { paid: Some(amount().amount()), ..Default::default() };
        let events = EventPublisher::disabled();
        let user = buyer(&repo).await;

        let session = create_deposit(&repo, &gateway, &config(), &user, DepositRequest { amount: amount() })
            .await
            .unwrap();
        assert!(session.payment_url.ends_with(&session.deposit.transaction_reference));
        assert_eq!(session.deposit.status, DepositStatus::Pending);

        let first = settle_from_callback(&repo, &gateway, &events, CallbackKind::Success, success(&session.deposit))
            .await
            .unwrap();
        assert!(first.applied);
        assert_eq!(first.deposit.status, DepositStatus::Completed);

        let replay = settle_from_callback(&repo, &gateway, &events, CallbackKind::Success, success(&session.deposit))
            .await
            .unwrap();
        assert!(!replay.applied);
        assert_eq!(gateway.validations.load(Ordering::SeqCst), 1);
        assert_eq!(repo.user_by_id(user.id).await.unwrap().unwrap().balance, amount());
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_not_credited() {
        let repo = MemoryRepository::new();
        let gateway = FakeGateway { paid: Some(Decimal::new(100, 2)), ..Default::default() };
        let user = buyer(&repo).await;
        let session = create_deposit(&repo, &gateway, &config(), &user, DepositRequest { amount: amount() })
            .await
            .unwrap();
        let err = settle_from_callback(
            &repo,
            &gateway,
            &EventPublisher::disabled(),
            CallbackKind::Success,
            success(&session.deposit),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ShopError::Validation(_)));
        let deposit = repo.deposit(session.deposit.id).await.unwrap().unwrap();
        assert!(deposit.is_pending());
        assert_eq!(repo.user_by_id(user.id).await.unwrap().unwrap().balance, Money::ZERO);
    }

    #[tokio::test]
    async fn test_fail_callback_and_unknown_reference() {
        let repo = MemoryRepository::new();
        let gateway = FakeGateway::default();
        let events = EventPublisher::disabled();
        let user = buyer(&repo).await;
        let session = create_deposit(&repo, &gateway, &config(), &user, DepositRequest { amount: amount() })
            .await
            .unwrap();

        let callback = GatewayCallback { tran_id: session.deposit.transaction_reference.clone(), ..Default::default() };
        let settled = settle_from_callback(&repo, &gateway, &events, CallbackKind::Cancel, callback).await.unwrap();
        assert_eq!(settled.deposit.status, DepositStatus::Failed);

        let bogus = GatewayCallback { tran_id: "trx_123".into(), ..Default::default() };
        let err = settle_from_callback(&repo, &gateway, &events, CallbackKind::Fail, bogus).await.unwrap_err();
        assert!(matches!(err, ShopError::Validation(_)));
    }

    #[tokio::test]
    async fn test_failed_session_marks_deposit_failed() {
        let repo = MemoryRepository::new();
        let gateway = FakeGateway { fail_sessions: true, ..Default::default() };
        let user = buyer(&repo).await;
        let err = create_deposit(&repo, &gateway, &config(), &user, DepositRequest { amount: amount() })
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Gateway(_)));
        let deposits = repo.deposits(crate::repository::DepositScope::User(user.id), Default::default()).await.unwrap();
        assert_eq!(deposits.items[0].status, DepositStatus::Failed);
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected() {
        let repo = MemoryRepository::new();
        let user = buyer(&repo).await;
        let err = create_deposit(&repo, &FakeGateway::default(), &config(), &user, DepositRequest { amount: Money::ZERO })
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Validation(_)));
    }
}
