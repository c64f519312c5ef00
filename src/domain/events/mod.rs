//! Domain events
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::deposit::DepositStatus;
use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderPlaced { order_id: Uuid, user_id: Uuid, total: Money, items: usize },
    OrderStatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    DepositSettled { deposit_id: Uuid, user_id: Uuid, amount: Money, status: DepositStatus },
}

impl DomainEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "grocera.orders.placed",
            Self::OrderStatusChanged { .. } => "grocera.orders.status_changed",
            Self::DepositSettled { .. } => "grocera.deposits.settled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_is_tagged() {
        let event = DomainEvent::OrderStatusChanged {
            order_id: Uuid::nil(),
            from: OrderStatus::Shipped,
            to: OrderStatus::OutForDelivery,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order_status_changed");
        assert_eq!(json["to"], "Out for Delivery");
        assert_eq!(event.subject(), "grocera.orders.status_changed");
    }
}
