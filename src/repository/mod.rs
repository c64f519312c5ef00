//! Persistence seam.
//!
//! `Repository` is implemented by [`PgRepository`] for PostgreSQL and by
//! [`MemoryRepository`] for tests and database-less runs. Operations that touch
//! more than one row (placing an order, changing an order's status, settling a
//! deposit) are atomic in both.

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::product::{ProductFilter, ProductOrdering};
use crate::domain::aggregates::{
    Cart, CartItem, Category, CategorySummary, Deposit, DepositOutcome, NewCategory, NewProduct, NewReview,
    NewUser, Order, OrderStatus, Product, ProductImage, ProductUpdate, ProfileUpdate, Review, Role, User,
    WishlistItem,
};
use crate::domain::value_objects::{Email, Money, Quantity};
use crate::Result;

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// One-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self { Self { page: 1, per_page: DEFAULT_PER_PAGE } }
}

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }
    pub fn limit(&self) -> i64 { i64::from(self.per_page) }
    pub fn offset(&self) -> i64 { i64::from(self.page - 1) * i64::from(self.per_page) }

    /// Cut one page out of an already ordered list.
    pub fn slice<T>(&self, items: Vec<T>) -> Paged<T> {
        let total = items.len() as i64;
        let items = items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.per_page as usize)
            .collect();
        Paged { items, total }
    }
}

#[derive(Clone, Debug)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    pub filter: ProductFilter,
    pub ordering: ProductOrdering,
    pub page: Page,
}

/// Which orders a listing covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderScope {
    All,
    /// Orders with at least one line sold by this seller.
    Seller(Uuid),
    Buyer(Uuid),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepositScope {
    All,
    User(Uuid),
}

/// Result of settling a deposit. `applied` is false when the deposit had
/// already left `pending`, i.e. the callback was a replay.
#[derive(Clone, Debug)]
pub struct Settlement {
    pub deposit: Deposit,
    pub applied: bool,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct ProductStock {
    pub id: Uuid,
    pub name: String,
    pub seller_id: Uuid,
    pub stock: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct AdminDashboard {
    pub total_products: i64,
    pub total_orders: i64,
    pub products: Vec<ProductStock>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SellerDashboard {
    pub total_products: i64,
    /// Order lines of this seller's products, canceled orders excluded.
    pub total_sales: i64,
    /// Summed across orders, outside the single-amount `Money` range.
    pub total_revenue: Decimal,
    pub products: Vec<ProductStock>,
}

#[async_trait]
pub trait Repository: Send + Sync {
    // users
    async fn create_user(&self, user: NewUser, role: Role) -> Result<User>;
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &Email) -> Result<Option<User>>;
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>>;
    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>>;

    // categories
    async fn list_categories(&self, page: Page) -> Result<Paged<CategorySummary>>;
    async fn category(&self, id: Uuid) -> Result<Option<CategorySummary>>;
    async fn create_category(&self, new: NewCategory) -> Result<Category>;
    async fn update_category(&self, id: Uuid, new: NewCategory) -> Result<Option<Category>>;
    async fn delete_category(&self, id: Uuid) -> Result<bool>;

    // products
    async fn list_products(&self, query: &ProductQuery) -> Result<Paged<Product>>;
    async fn product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn create_product(&self, seller_id: Uuid, new: NewProduct) -> Result<Product>;
    async fn update_product(&self, id: Uuid, update: ProductUpdate) -> Result<Option<Product>>;
    async fn delete_product(&self, id: Uuid) -> Result<bool>;
    async fn product_images(&self, product_id: Uuid) -> Result<Vec<ProductImage>>;
    async fn add_product_image(&self, product_id: Uuid, url: String) -> Result<ProductImage>;
    async fn delete_product_image(&self, product_id: Uuid, image_id: Uuid) -> Result<bool>;

    // reviews
    async fn reviews(&self, product_id: Uuid) -> Result<Vec<Review>>;
    async fn review(&self, product_id: Uuid, review_id: Uuid) -> Result<Option<Review>>;
    async fn create_review(&self, product_id: Uuid, user_id: Uuid, new: NewReview) -> Result<Review>;
    async fn update_review(&self, review_id: Uuid, new: NewReview) -> Result<Option<Review>>;
    async fn delete_review(&self, review_id: Uuid) -> Result<bool>;

    // wishlist
    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>>;
    async fn wishlist_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<WishlistItem>>;
    /// Fails with `Conflict` if the product is already on the list.
    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem>;
    async fn remove_from_wishlist(&self, user_id: Uuid, item_id: Uuid) -> Result<bool>;

    // carts
    /// The user's cart, created on first access.
    async fn cart_for_user(&self, user_id: Uuid) -> Result<Cart>;
    async fn cart(&self, cart_id: Uuid) -> Result<Option<Cart>>;
    /// Adds a line, merging with an existing line for the same product.
    async fn add_cart_item(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity) -> Result<CartItem>;
    async fn update_cart_item(&self, cart_id: Uuid, item_id: Uuid, quantity: Quantity) -> Result<Option<CartItem>>;
    async fn remove_cart_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool>;

    // orders
    /// Converts the cart into an order in one atomic step: validates the
    /// checkout rules, debits the buyer, decrements stock, snapshots prices
    /// and deletes the cart.
    async fn place_order(&self, user_id: Uuid, cart_id: Uuid) -> Result<Order>;
    async fn orders(&self, scope: OrderScope, page: Page) -> Result<Paged<Order>>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>>;
    /// Moves the order from `from` to `to`, failing with `Conflict` if its
    /// status is no longer `from`. Moving to `Canceled` refunds the buyer and
    /// restocks the products in the same step.
    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<Order>;
    async fn delete_order(&self, id: Uuid) -> Result<bool>;

    // deposits
    async fn create_deposit(&self, user_id: Uuid, amount: Money) -> Result<Deposit>;
    async fn deposits(&self, scope: DepositScope, page: Page) -> Result<Paged<Deposit>>;
    async fn deposit(&self, id: Uuid) -> Result<Option<Deposit>>;
    /// Settles a pending deposit, crediting the owner when it completes.
    async fn settle_deposit(&self, id: Uuid, outcome: DepositOutcome) -> Result<Settlement>;
    async fn delete_deposit(&self, id: Uuid) -> Result<bool>;

    // dashboards
    async fn admin_dashboard(&self) -> Result<AdminDashboard>;
    async fn seller_dashboard(&self, seller_id: Uuid) -> Result<SellerDashboard>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        let page = Page::new(Some(0), Some(500));
        assert_eq!(page, Page { page: 1, per_page: MAX_PER_PAGE });
        let page = Page::new(Some(3), Some(5));
        assert_eq!(page.offset(), 10);
        assert_eq!(page.limit(), 5);
        assert_eq!(Page::new(None, None), Page::default());
    }

    #[test]
    fn test_page_slice() {
        let paged = Page::new(Some(2), Some(2)).slice((1..=5).collect::<Vec<_>>());
        assert_eq!(paged.items, vec![3, 4]);
        assert_eq!(paged.total, 5);
        let paged = Page::new(Some(9), Some(2)).slice((1..=5).collect::<Vec<_>>());
        assert!(paged.items.is_empty());
    }
}
