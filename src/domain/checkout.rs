//! Order admission rules.
//!
//! `plan_order` is evaluated against rows read inside the same transaction that
//! applies the plan, so the prices it snapshots and the stock it checks are the
//! values the writes act on. A plan is all-or-nothing: any failed check returns
//! an error before a single write is issued.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::order::{Order, OrderItem, OrderStatus};
use crate::domain::aggregates::user::User;
use crate::domain::value_objects::{Money, Quantity, ValueError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Insufficient balance. Please deposit more funds.")]
    InsufficientBalance { required: Money, available: Money },
    #[error("Address is required for order confirmation.")]
    MissingAddress,
    #[error("Not enough stock for product {product}")]
    InsufficientStock { product: String },
    #[error(transparent)]
    Amount(#[from] ValueError),
}

/// A cart line joined with the product row it refers to.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub product_name: String,
    pub price: Money,
    pub stock: i32,
    pub quantity: Quantity,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedItem {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub product_name: String,
    pub quantity: Quantity,
    pub price: Money,
    pub total_price: Money,
}

#[derive(Clone, Debug)]
pub struct OrderPlan {
    pub total: Money,
    pub remaining_balance: Money,
    pub items: Vec<PlannedItem>,
    /// Stock left per product once the order is applied.
    pub remaining_stock: Vec<(Uuid, i32)>,
}

pub fn plan_order(buyer: &User, lines: &[CheckoutLine]) -> Result<OrderPlan, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let line_totals = lines.iter().map(|l| l.price.times(l.quantity)).collect::<Result<Vec<_>, _>>()?;
    let total = Money::total(line_totals.iter().copied())?;
    let remaining_balance = buyer.balance.checked_sub(total).ok_or(CheckoutError::InsufficientBalance {
        required: total,
        available: buyer.balance,
    })?;
    if !buyer.has_address() {
        return Err(CheckoutError::MissingAddress);
    }

    let mut demand: HashMap<Uuid, i32> = HashMap::new();
    let mut remaining_stock = Vec::with_capacity(lines.len());
    for line in lines {
        let wanted = demand.entry(line.product_id).or_insert(0);
        *wanted += line.quantity.value();
        if *wanted > line.stock {
            return Err(CheckoutError::InsufficientStock { product: line.product_name.clone() });
        }
        remaining_stock.retain(|(id, _)| *id != line.product_id);
        remaining_stock.push((line.product_id, line.stock - *wanted));
    }

    let items = lines
        .iter()
        .zip(line_totals)
        .map(|(l, total_price)| PlannedItem {
            product_id: l.product_id,
            seller_id: l.seller_id,
            product_name: l.product_name.clone(),
            quantity: l.quantity,
            price: l.price,
            total_price,
        })
        .collect();

    Ok(OrderPlan { total, remaining_balance, items, remaining_stock })
}

impl OrderPlan {
    pub fn to_order(&self, user_id: Uuid, now: DateTime<Utc>) -> Order {
        let id = Uuid::now_v7();
        Order {
            id,
            user_id,
            status: OrderStatus::Pending,
            total_price: self.total,
            created_at: now,
            updated_at: now,
            items: self
                .items
                .iter()
                .map(|i| OrderItem {
                    id: Uuid::now_v7(),
                    order_id: id,
                    product_id: Some(i.product_id),
                    seller_id: i.seller_id,
                    product_name: i.product_name.clone(),
                    quantity: i.quantity,
                    price: i.price,
                    total_price: i.total_price,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::user::{NewUser, Role};
    use crate::domain::value_objects::Email;
    use rust_decimal::Decimal;

    fn money(v: i64) -> Money { Money::new(Decimal::new(v, 0)).unwrap() }

    fn buyer(balance: i64, address: Option<&str>) -> User {
        let mut u = NewUser {
            email: Email::parse("buyer@example.com").unwrap(),
            password_hash: String::new(),
            first_name: "Rafi".into(),
            last_name: "Ahmed".into(),
            address: address.map(String::from),
            phone_number: None,
        }
        .into_user(Role::Buyer);
        u.balance = money(balance);
        u
    }

    fn line(name: &str, price: i64, stock: i32, qty: i32) -> CheckoutLine {
        CheckoutLine {
            product_id: Uuid::now_v7(),
            seller_id: Uuid::now_v7(),
            product_name: name.into(),
            price: money(price),
            stock,
            quantity: Quantity::new(qty).unwrap(),
        }
    }

    #[test]
    fn test_plan_debits_and_snapshots() {
        let lines = vec![line("Rice", 80, 10, 2), line("Oil", 150, 3, 1)];
        let plan = plan_order(&buyer(400, Some("Road 5, Dhaka")), &lines).unwrap();
        assert_eq!(plan.total, money(310));
        assert_eq!(plan.remaining_balance, money(90));
        assert_eq!(plan.items[0].price, money(80));
        assert_eq!(plan.items[0].total_price, money(160));
        assert_eq!(plan.remaining_stock, vec![(lines[0].product_id, 8), (lines[1].product_id, 2)]);
    }

    #[test]
    fn test_exact_balance_and_stock_are_enough() {
        let plan = plan_order(&buyer(100, Some("x")), &[line("Tea", 50, 2, 2)]).unwrap();
        assert!(plan.remaining_balance.is_zero());
        assert_eq!(plan.remaining_stock[0].1, 0);
    }

    #[test]
    fn test_rejections() {
        let addr = Some("Road 5");
        assert_eq!(plan_order(&buyer(100, addr), &[]).unwrap_err(), CheckoutError::EmptyCart);
        assert!(matches!(
            plan_order(&buyer(10, addr), &[line("Tea", 50, 5, 1)]),
            Err(CheckoutError::InsufficientBalance { .. })
        ));
        assert_eq!(
            plan_order(&buyer(100, Some("  ")), &[line("Tea", 50, 5, 1)]).unwrap_err(),
            CheckoutError::MissingAddress
        );
        assert_eq!(
            plan_order(&buyer(500, addr), &[line("Tea", 50, 5, 1), line("Salt", 10, 1, 2)]).unwrap_err(),
            CheckoutError::InsufficientStock { product: "Salt".into() }
        );
    }

    #[test]
    fn test_total_beyond_the_money_range_is_rejected() {
        let mut pricey = line("Saffron", 0, 10, 2);
        pricey.price = Money::MAX;
        assert_eq!(
            plan_order(&buyer(100, Some("x")), &[pricey]).unwrap_err(),
            CheckoutError::Amount(ValueError::TooLarge)
        );
    }

    #[test]
    fn test_repeated_product_counts_cumulative_demand() {
        let first = line("Milk", 10, 3, 2);
        let mut second = first.clone();
        second.quantity = Quantity::new(2).unwrap();
        assert!(matches!(
            plan_order(&buyer(100, Some("x")), &[first, second]),
            Err(CheckoutError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn test_order_from_plan() {
        let plan = plan_order(&buyer(400, Some("x")), &[line("Rice", 80, 10, 2)]).unwrap();
        let user_id = Uuid::now_v7();
        let order = plan.to_order(user_id, Utc::now());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price, money(160));
        assert_eq!(order.items.len(), 1);
        assert!(order.items.iter().all(|i| i.order_id == order.id));
        assert!(order.belongs_to(user_id));
    }
}
