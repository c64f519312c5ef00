//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity, ValueError};

/// A buyer's basket. Each user owns at most one.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<CartItem>,
}

/// Cart line joined with the product's current name and list price.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: Quantity,
}

impl CartItem {
    pub fn line_total(&self) -> Result<Money, ValueError> { self.unit_price.times(self.quantity) }
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        Self { id: Uuid::now_v7(), user_id, created_at: Utc::now(), items: vec![] }
    }

    pub fn total(&self) -> Result<Money, ValueError> {
        self.items.iter().try_fold(Money::ZERO, |sum, item| sum.checked_add(item.line_total()?))
    }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn item(&self, item_id: Uuid) -> Option<&CartItem> { self.items.iter().find(|i| i.id == item_id) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_cart_total() {
        let mut cart = Cart::new(Uuid::now_v7());
        assert!(cart.is_empty());
        assert!(cart.total().unwrap().is_zero());
        for (price, qty) in [(1050, 2), (300, 1)] {
            cart.items.push(CartItem {
                id: Uuid::now_v7(),
                cart_id: cart.id,
                product_id: Uuid::now_v7(),
                product_name: "Tea".into(),
                unit_price: Money::new(Decimal::new(price, 2)).unwrap(),
                quantity: Quantity::new(qty).unwrap(),
            });
        }
        assert_eq!(cart.total().unwrap().amount(), Decimal::new(2400, 2));
        let first = cart.items[0].id;
        assert_eq!(cart.item(first).map(|i| i.quantity.value()), Some(2));
    }

    #[test]
    fn test_cart_total_overflow_is_an_error() {
        let mut cart = Cart::new(Uuid::now_v7());
        cart.items.push(CartItem {
            id: Uuid::now_v7(),
            cart_id: cart.id,
            product_id: Uuid::now_v7(),
            product_name: "Saffron".into(),
            unit_price: Money::MAX,
            quantity: Quantity::new(2).unwrap(),
        });
        assert_eq!(cart.total(), Err(ValueError::TooLarge));
    }
}
