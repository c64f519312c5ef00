//! Role checks for API callers.
//!
//! Every check is a plain predicate over the caller and, where relevant, the
//! resource. Handlers decide whether a failed check is a 403 or a 404; resources
//! a caller may not see are reported as missing.

use uuid::Uuid;

use crate::domain::aggregates::{Deposit, Order, Product, Review, Role, User};

/// The authenticated caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
    pub fn is_seller(&self) -> bool { self.role == Role::Seller }
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self { Self { user_id: user.id, role: user.role } }
}

/// Categories are readable by anyone and writable by staff.
pub fn can_manage_catalog(p: &Principal) -> bool { p.is_admin() }

pub fn can_create_product(p: &Principal) -> bool { p.is_admin() || p.is_seller() }

/// Owner-or-staff rule shared by products and their images.
pub fn can_modify_product(p: &Principal, product: &Product) -> bool {
    p.is_admin() || product.seller_id == p.user_id
}

pub fn can_view_order(p: &Principal, order: &Order) -> bool {
    p.is_admin() || order.belongs_to(p.user_id) || (p.is_seller() && order.involves_seller(p.user_id))
}

/// Forward fulfilment moves are for staff and for sellers with goods in the order.
pub fn can_update_order_status(p: &Principal, order: &Order) -> bool {
    p.is_admin() || (p.is_seller() && order.involves_seller(p.user_id))
}

pub fn can_cancel_order(p: &Principal, order: &Order) -> bool {
    p.is_admin() || order.belongs_to(p.user_id)
}

pub fn can_delete_order(p: &Principal) -> bool { p.is_admin() }

pub fn can_edit_review(p: &Principal, review: &Review) -> bool { review.user_id == p.user_id }

pub fn can_delete_review(p: &Principal, review: &Review) -> bool {
    p.is_admin() || review.user_id == p.user_id
}

pub fn can_view_deposit(p: &Principal, deposit: &Deposit) -> bool {
    p.is_admin() || deposit.user_id == p.user_id
}

pub fn can_delete_deposit(p: &Principal) -> bool { p.is_admin() }

pub fn can_assign_roles(p: &Principal) -> bool { p.is_admin() }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::{OrderItem, OrderStatus};
    use crate::domain::value_objects::{Money, Quantity};
    use chrono::Utc;

    fn principal(role: Role) -> Principal { Principal { user_id: Uuid::now_v7(), role } }

    fn order_for(buyer: Uuid, seller: Uuid) -> Order {
        let id = Uuid::now_v7();
        Order {
            id,
            user_id: buyer,
            status: OrderStatus::Pending,
            total_price: Money::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: vec![OrderItem {
                id: Uuid::now_v7(),
                order_id: id,
                product_id: Some(Uuid::now_v7()),
                seller_id: seller,
                product_name: "Honey".into(),
                quantity: Quantity::new(1).unwrap(),
                price: Money::ZERO,
                total_price: Money::ZERO,
            }],
        }
    }

    #[test]
    fn test_order_visibility_and_status_rights() {
        let buyer = principal(Role::Buyer);
        let seller = principal(Role::Seller);
        let other_seller = principal(Role::Seller);
        let admin = principal(Role::Admin);
        let order = order_for(buyer.user_id, seller.user_id);

        assert!(can_view_order(&buyer, &order));
        assert!(can_view_order(&seller, &order));
        assert!(!can_view_order(&other_seller, &order));
        assert!(can_view_order(&admin, &order));

        assert!(!can_update_order_status(&buyer, &order));
        assert!(can_update_order_status(&seller, &order));
        assert!(!can_update_order_status(&other_seller, &order));
        assert!(can_update_order_status(&admin, &order));

        assert!(can_cancel_order(&buyer, &order));
        assert!(!can_cancel_order(&seller, &order));
        assert!(can_cancel_order(&admin, &order));
        assert!(!can_cancel_order(&principal(Role::Buyer), &order));
    }

    #[test]
    fn test_seller_role_is_needed_for_seller_visibility() {
        let buyer = principal(Role::Buyer);
        // a buyer whose id happens to match a seller line does not gain seller rights
        let order = order_for(Uuid::now_v7(), buyer.user_id);
        assert!(!can_view_order(&buyer, &order));
        assert!(!can_update_order_status(&buyer, &order));
    }

    #[test]
    fn test_catalog_rights() {
        assert!(can_manage_catalog(&principal(Role::Admin)));
        assert!(!can_manage_catalog(&principal(Role::Seller)));
        assert!(can_create_product(&principal(Role::Seller)));
        assert!(can_create_product(&principal(Role::Admin)));
        assert!(!can_create_product(&principal(Role::Buyer)));
    }
}
