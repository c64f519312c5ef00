//! Order use cases: placement, visibility and the fulfilment workflow.

use tracing::instrument;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, User};
use crate::domain::events::DomainEvent;
use crate::permissions::{self, Principal};
use crate::repository::{OrderScope, Page, Paged, Repository};
use crate::services::{notifications, EventPublisher};
use crate::{Result, ShopError};

/// Orders a caller may list: everything for admins, orders carrying their
/// goods for sellers, their own orders for buyers.
pub fn scope_for(principal: &Principal) -> OrderScope {
    if principal.is_admin() {
        OrderScope::All
    } else if principal.is_seller() {
        OrderScope::Seller(principal.user_id)
    } else {
        OrderScope::Buyer(principal.user_id)
    }
}

pub async fn list_orders(repo: &dyn Repository, principal: &Principal, page: Page) -> Result<Paged<Order>> {
    repo.orders(scope_for(principal), page).await
}

/// Orders the caller may not see are reported as missing.
pub async fn visible_order(repo: &dyn Repository, principal: &Principal, id: Uuid) -> Result<Order> {
    repo.order(id)
        .await?
        .filter(|order| permissions::can_view_order(principal, order))
        .ok_or(ShopError::NotFound("Order"))
}

#[instrument(skip(repo, events, buyer), fields(user_id = %buyer.id))]
pub async fn place_order(repo: &dyn Repository, events: &EventPublisher, buyer: &User, cart_id: Uuid) -> Result<Order> {
    let order = repo.place_order(buyer.id, cart_id).await?;
    tracing::info!(order_id = %order.id, total = %order.total_price, items = order.items.len(), "order placed");
    events
        .publish(&DomainEvent::OrderPlaced {
            order_id: order.id,
            user_id: buyer.id,
            total: order.total_price,
            items: order.items.len(),
        })
        .await;
    notifications::send_order_confirmation(events, buyer, &order).await;
    Ok(order)
}

/// Buyer-facing cancellation, open until the order is delivered. Refunds the
/// order total and restocks its lines.
#[instrument(skip(repo, events, principal), fields(user_id = %principal.user_id))]
pub async fn cancel_order(
    repo: &dyn Repository,
    events: &EventPublisher,
    principal: &Principal,
    order_id: Uuid,
) -> Result<Order> {
    let order = visible_order(repo, principal, order_id).await?;
    if !permissions::can_cancel_order(principal, &order) {
        return Err(ShopError::Forbidden("You do not have permission to cancel this order".into()));
    }
    order.status.check_cancel()?;
    transition(repo, events, order, OrderStatus::Canceled).await
}

#[instrument(skip(repo, events, principal), fields(user_id = %principal.user_id))]
pub async fn update_status(
    repo: &dyn Repository,
    events: &EventPublisher,
    principal: &Principal,
    order_id: Uuid,
    status: OrderStatus,
) -> Result<Order> {
    let order = visible_order(repo, principal, order_id).await?;
    if !permissions::can_update_order_status(principal, &order) {
        return Err(ShopError::Forbidden("You do not have permission to update this order".into()));
    }
    order.status.check_transition(status)?;
    transition(repo, events, order, status).await
}

/// Applies an already checked move as a compare-and-set on the current status.
async fn transition(repo: &dyn Repository, events: &EventPublisher, order: Order, to: OrderStatus) -> Result<Order> {
    let from = order.status;
    let updated = repo.transition_order(order.id, from, to).await?;
    tracing::info!(order_id = %updated.id, %from, %to, "order status changed");
    events.publish(&DomainEvent::OrderStatusChanged { order_id: updated.id, from, to }).await;
    Ok(updated)
}

pub async fn delete_order(repo: &dyn Repository, principal: &Principal, order_id: Uuid) -> Result<()> {
    if !permissions::can_delete_order(principal) {
        return Err(ShopError::Forbidden("Only staff can delete orders".into()));
    }
    if !repo.delete_order(order_id).await? {
        return Err(ShopError::NotFound("Order"));
    }
    tracing::info!(%order_id, "order deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{NewProduct, NewUser, ProfileUpdate, Role};
    use crate::domain::checkout::CheckoutError;
    use crate::domain::aggregates::TransitionError;
    use crate::domain::value_objects::{Email, Money, Quantity};
    use crate::repository::MemoryRepository;
    use rust_decimal::Decimal;

    struct Shop {
        repo: MemoryRepository,
        events: EventPublisher,
        buyer: User,
        seller: User,
        product: Uuid,
    }

    async fn user(repo: &MemoryRepository, email: &str, role: Role) -> User {
        let new = NewUser {
            email: Email::parse(email).unwrap(),
            password_hash: String::new(),
            first_name: "Test".into(),
            last_name: "User".into(),
            address: None,
            phone_number: None,
        };
        repo.create_user(new, role).await.unwrap()
    }

    fn money(cents: i64) -> Money { Money::new(Decimal::new(cents, 2)).unwrap() }

    async fn shop() -> Shop {
        let repo = MemoryRepository::new();
        let buyer = user(&repo, "buyer@example.com", Role::Buyer).await;
        let seller = user(&repo, "seller@example.com", Role::Seller).await;
        let product = repo
            .create_product(
                seller.id,
                NewProduct {
                    name: "Mustard oil".into(),
                    description: String::new(),
                    price: money(25_000),
                    stock: 5,
                    category_id: None,
                },
            )
            .await
            .unwrap();
        repo.update_profile(buyer.id, ProfileUpdate { address: Some("House 7, Dhanmondi".into()), ..Default::default() })
            .await
            .unwrap();
        repo.set_balance(buyer.id, money(100_000)).await.unwrap();
        let buyer = repo.user_by_id(buyer.id).await.unwrap().unwrap();
        Shop { repo, events: EventPublisher::disabled(), buyer, seller, product: product.id }
    }

    async fn fill_cart(shop: &Shop, qty: i32) -> Uuid {
        let cart = shop.repo.cart_for_user(shop.buyer.id).await.unwrap();
        shop.repo.add_cart_item(cart.id, shop.product, Quantity::new(qty).unwrap()).await.unwrap();
        cart.id
    }

    #[tokio::test]
    async fn test_place_order_debits_and_restocks_on_cancel() {
        let shop = shop().await;
        let cart = fill_cart(&shop, 2).await;
        let order = place_order(&shop.repo, &shop.events, &shop.buyer, cart).await.unwrap();
        assert_eq!(order.total_price, money(50_000));
        assert_eq!(order.status, OrderStatus::Pending);

        let buyer = shop.repo.user_by_id(shop.buyer.id).await.unwrap().unwrap();
        assert_eq!(buyer.balance, money(50_000));
        assert_eq!(shop.repo.product(shop.product).await.unwrap().unwrap().stock, 3);
        assert!(shop.repo.cart(cart).await.unwrap().is_none());

        let principal = Principal::from(&shop.buyer);
        let canceled = cancel_order(&shop.repo, &shop.events, &principal, order.id).await.unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        let buyer = shop.repo.user_by_id(shop.buyer.id).await.unwrap().unwrap();
        assert_eq!(buyer.balance, money(100_000));
        assert_eq!(shop.repo.product(shop.product).await.unwrap().unwrap().stock, 5);

        // a second cancel must not refund again
        let again = cancel_order(&shop.repo, &shop.events, &principal, order.id).await.unwrap_err();
        assert!(matches!(again, ShopError::Transition(TransitionError::Terminal(_))));
        let buyer = shop.repo.user_by_id(shop.buyer.id).await.unwrap().unwrap();
        assert_eq!(buyer.balance, money(100_000));
    }

    #[tokio::test]
    async fn test_rejected_order_changes_nothing() {
        let shop = shop().await;
        let cart = fill_cart(&shop, 6).await;
        let err = place_order(&shop.repo, &shop.events, &shop.buyer, cart).await.unwrap_err();
        assert!(matches!(err, ShopError::Checkout(CheckoutError::InsufficientBalance { .. })));
        assert_eq!(shop.repo.product(shop.product).await.unwrap().unwrap().stock, 5);
        assert_eq!(shop.repo.cart(cart).await.unwrap().unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_seller_drives_fulfilment_and_delivered_blocks_cancel() {
        let shop = shop().await;
        let cart = fill_cart(&shop, 1).await;
        let order = place_order(&shop.repo, &shop.events, &shop.buyer, cart).await.unwrap();
        let seller = Principal::from(&shop.seller);
        let buyer = Principal::from(&shop.buyer);

        let err = update_status(&shop.repo, &shop.events, &buyer, order.id, OrderStatus::Processing).await;
        assert!(matches!(err, Err(ShopError::Forbidden(_))));

        for next in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::OutForDelivery, OrderStatus::Delivered] {
            let updated = update_status(&shop.repo, &shop.events, &seller, order.id, next).await.unwrap();
            assert_eq!(updated.status, next);
        }

        let err = cancel_order(&shop.repo, &shop.events, &buyer, order.id).await.unwrap_err();
        assert!(matches!(err, ShopError::Transition(TransitionError::DeliveredCannotCancel)));
    }

    #[tokio::test]
    async fn test_buyer_cancels_shipped_order_with_one_refund() {
        let shop = shop().await;
        let cart = fill_cart(&shop, 2).await;
        let order = place_order(&shop.repo, &shop.events, &shop.buyer, cart).await.unwrap();
        let seller = Principal::from(&shop.seller);
        for next in [OrderStatus::Processing, OrderStatus::Shipped] {
            update_status(&shop.repo, &shop.events, &seller, order.id, next).await.unwrap();
        }

        let buyer = Principal::from(&shop.buyer);
        let canceled = cancel_order(&shop.repo, &shop.events, &buyer, order.id).await.unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        assert_eq!(shop.repo.user_by_id(shop.buyer.id).await.unwrap().unwrap().balance, money(100_000));
        assert_eq!(shop.repo.product(shop.product).await.unwrap().unwrap().stock, 5);

        let again = cancel_order(&shop.repo, &shop.events, &buyer, order.id).await.unwrap_err();
        assert!(matches!(again, ShopError::Transition(TransitionError::Terminal(OrderStatus::Canceled))));
        assert_eq!(shop.repo.user_by_id(shop.buyer.id).await.unwrap().unwrap().balance, money(100_000));
    }

    #[tokio::test]
    async fn test_fulfilment_moves_still_follow_the_table() {
        let shop = shop().await;
        let cart = fill_cart(&shop, 1).await;
        let order = place_order(&shop.repo, &shop.events, &shop.buyer, cart).await.unwrap();
        let seller = Principal::from(&shop.seller);
        for next in [OrderStatus::Processing, OrderStatus::Shipped] {
            update_status(&shop.repo, &shop.events, &seller, order.id, next).await.unwrap();
        }
        let err = update_status(&shop.repo, &shop.events, &seller, order.id, OrderStatus::Canceled).await.unwrap_err();
        assert!(matches!(err, ShopError::Transition(TransitionError::NotAllowed { .. })));
    }

    #[tokio::test]
    async fn test_skipping_a_step_is_rejected() {
        let shop = shop().await;
        let cart = fill_cart(&shop, 1).await;
        let order = place_order(&shop.repo, &shop.events, &shop.buyer, cart).await.unwrap();
        let seller = Principal::from(&shop.seller);
        let err = update_status(&shop.repo, &shop.events, &seller, order.id, OrderStatus::Delivered).await.unwrap_err();
        assert!(matches!(err, ShopError::Transition(TransitionError::NotAllowed { .. })));
    }

    #[tokio::test]
    async fn test_visibility_and_delete() {
        let shop = shop().await;
        let cart = fill_cart(&shop, 1).await;
        let order = place_order(&shop.repo, &shop.events, &shop.buyer, cart).await.unwrap();

        let stranger = user(&shop.repo, "other@example.com", Role::Buyer).await;
        let stranger = Principal::from(&stranger);
        assert!(matches!(visible_order(&shop.repo, &stranger, order.id).await, Err(ShopError::NotFound(_))));
        assert_eq!(list_orders(&shop.repo, &stranger, Page::default()).await.unwrap().total, 0);

        let seller = Principal::from(&shop.seller);
        assert_eq!(list_orders(&shop.repo, &seller, Page::default()).await.unwrap().total, 1);
        assert!(matches!(delete_order(&shop.repo, &seller, order.id).await, Err(ShopError::Forbidden(_))));

        let admin = Principal { user_id: Uuid::now_v7(), role: Role::Admin };
        delete_order(&shop.repo, &admin, order.id).await.unwrap();
        assert!(matches!(delete_order(&shop.repo, &admin, order.id).await, Err(ShopError::NotFound(_))));
    }
}
