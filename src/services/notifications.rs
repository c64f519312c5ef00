//! Customer emails.
//!
//! Messages are rendered here and handed to the mail relay through the event
//! bus; without NATS they only show up in the logs.

use serde::Serialize;
use std::fmt::Write;

use crate::domain::aggregates::{Order, User};
use crate::services::EventPublisher;

pub const EMAIL_SUBJECT: &str = "grocera.notifications.email";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub fn order_confirmation(buyer: &User, order: &Order) -> EmailMessage {
    let mut body = format!(
        "Hi {name},\nThank you for your order {name}!\nOrder {id}\n\nOrder details:\n",
        name = buyer.first_name,
        id = order.id,
    );
    for item in &order.items {
        let _ = writeln!(
            body,
            "Product: {}, Quantity: {}, Price: {}",
            item.product_name,
            item.quantity.value(),
            item.price
        );
    }
    let _ = write!(
        body,
        "\nTotal Price: {}\n\nWe will notify you once your order ships.\n\nBest regards,\nGrocera",
        order.total_price
    );
    EmailMessage { to: buyer.email.to_string(), subject: "Grocera Order Confirmation".into(), body }
}

pub async fn send_order_confirmation(events: &EventPublisher, buyer: &User, order: &Order) {
    let message = order_confirmation(buyer, order);
    tracing::info!(to = %message.to, order_id = %order.id, "sending order confirmation email");
    events.publish_json(EMAIL_SUBJECT, &message).await;
}
