//! Deposit Aggregate
//!
//! A deposit is a wallet top-up paid through the hosted gateway. It is created
//! `pending` and settled exactly once by a gateway callback. The gateway echoes
//! back the transaction reference we gave it, `dep_<deposit id>`, which is how a
//! callback finds its deposit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::value_objects::Money;

const REFERENCE_PREFIX: &str = "dep_";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum DepositStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Final state a callback may move a pending deposit into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepositOutcome {
    Completed,
    Failed,
}

impl From<DepositOutcome> for DepositStatus {
    fn from(outcome: DepositOutcome) -> Self {
        match outcome {
            DepositOutcome::Completed => DepositStatus::Completed,
            DepositOutcome::Failed => DepositStatus::Failed,
        }
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Money,
    pub status: DepositStatus,
    pub transaction_reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deposit {
    pub fn pending(user_id: Uuid, amount: Money) -> Self {
        let id = Uuid::now_v7();
        let now = Utc::now();
        Self {
            id,
            user_id,
            amount,
            status: DepositStatus::Pending,
            transaction_reference: transaction_reference(id),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool { self.status == DepositStatus::Pending }
}

pub fn transaction_reference(deposit_id: Uuid) -> String {
    format!("{}{}", REFERENCE_PREFIX, deposit_id.simple())
}

/// Recover the deposit id from a gateway `tran_id`.
pub fn parse_transaction_reference(reference: &str) -> Option<Uuid> {
    reference
        .trim()
        .strip_prefix(REFERENCE_PREFIX)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_reference_round_trip() {
        let deposit = Deposit::pending(Uuid::now_v7(), Money::new(Decimal::new(500, 0)).unwrap());
        assert!(deposit.transaction_reference.starts_with("dep_"));
        assert!(deposit.transaction_reference.len() <= 100);
        assert_eq!(parse_transaction_reference(&deposit.transaction_reference), Some(deposit.id));
        assert!(deposit.is_pending());
    }

    #[test]
    fn test_reference_rejects_foreign_ids() {
        assert_eq!(parse_transaction_reference("trx_42"), None);
        assert_eq!(parse_transaction_reference("dep_not-a-uuid"), None);
        assert_eq!(parse_transaction_reference(""), None);
    }
}
