//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity};

/// Fulfilment status.
///
/// ```text
/// Pending -> Processing -> Shipped -> Out for Delivery -> Delivered
///    |           |
///    +-----------+-----> Canceled            (fulfilment moves)
/// ```
///
/// A cancellation request from the buyer or staff is accepted from any status
/// short of `Delivered`; see [`OrderStatus::check_cancel`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "processing")]
    Processing,
    #[serde(alias = "shipped")]
    Shipped,
    #[serde(rename = "Out for Delivery", alias = "out_for_delivery")]
    OutForDelivery,
    #[serde(alias = "delivered")]
    Delivered,
    #[serde(alias = "canceled")]
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Canceled) }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Canceled)
                | (Processing, Shipped)
                | (Processing, Canceled)
                | (Shipped, OutForDelivery)
                | (OutForDelivery, Delivered)
        )
    }

    pub fn check_transition(&self, next: OrderStatus) -> Result<(), TransitionError> {
        if *self == OrderStatus::Delivered && next == OrderStatus::Canceled {
            return Err(TransitionError::DeliveredCannotCancel);
        }
        if self.is_terminal() {
            return Err(TransitionError::Terminal(*self));
        }
        if !self.can_transition_to(next) {
            return Err(TransitionError::NotAllowed { from: *self, to: next });
        }
        Ok(())
    }

    pub fn check_cancel(&self) -> Result<(), TransitionError> {
        match self {
            Self::Delivered => Err(TransitionError::DeliveredCannotCancel),
            Self::Canceled => Err(TransitionError::Terminal(*self)),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::OutForDelivery => "Out for Delivery",
            Self::Delivered => "Delivered",
            Self::Canceled => "Canceled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("You can not cancel a delivered order")]
    DeliveredCannotCancel,
    #[error("Order is already {0}")]
    Terminal(OrderStatus),
    #[error("Order can not move from {from} to {to}")]
    NotAllowed { from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
}

/// Line captured at purchase time. `price` is the product's list price at that
/// moment and never follows later price changes.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Cleared if the product is later removed from the catalog.
    pub product_id: Option<Uuid>,
    pub seller_id: Uuid,
    pub product_name: String,
    pub quantity: Quantity,
    pub price: Money,
    pub total_price: Money,
}

impl Order {
    pub fn belongs_to(&self, user_id: Uuid) -> bool { self.user_id == user_id }

    pub fn involves_seller(&self, seller_id: Uuid) -> bool {
        self.items.iter().any(|i| i.seller_id == seller_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_forward_path() {
        let path = [Pending, Processing, Shipped, OutForDelivery, Delivered];
        for pair in path.windows(2) {
            assert!(pair[0].check_transition(pair[1]).is_ok(), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert_eq!(
            Pending.check_transition(Shipped),
            Err(TransitionError::NotAllowed { from: Pending, to: Shipped })
        );
        assert!(Shipped.check_transition(Processing).is_err());
        assert!(Processing.check_transition(Processing).is_err());
    }

    #[test]
    fn test_cancellation_window() {
        assert!(Pending.check_transition(Canceled).is_ok());
        assert!(Processing.check_transition(Canceled).is_ok());
        assert!(Shipped.check_transition(Canceled).is_err());
        assert!(OutForDelivery.check_transition(Canceled).is_err());
        assert_eq!(Delivered.check_transition(Canceled), Err(TransitionError::DeliveredCannotCancel));
        assert_eq!(Canceled.check_transition(Canceled), Err(TransitionError::Terminal(Canceled)));
        assert_eq!(Canceled.check_transition(Processing), Err(TransitionError::Terminal(Canceled)));
    }

    #[test]
    fn test_cancel_request_allowed_until_delivery() {
        for status in [Pending, Processing, Shipped, OutForDelivery] {
            assert!(status.check_cancel().is_ok(), "{status}");
        }
        assert_eq!(Delivered.check_cancel(), Err(TransitionError::DeliveredCannotCancel));
        assert_eq!(Canceled.check_cancel(), Err(TransitionError::Terminal(Canceled)));
    }

    #[test]
    fn test_status_serde_labels() {
        assert_eq!(serde_json::to_value(OutForDelivery).unwrap(), "Out for Delivery");
        assert_eq!(serde_json::from_str::<OrderStatus>("\"Out for Delivery\"").unwrap(), OutForDelivery);
        assert_eq!(serde_json::from_str::<OrderStatus>("\"shipped\"").unwrap(), Shipped);
        assert_eq!(OutForDelivery.to_string(), "Out for Delivery");
    }
}
