//! In-process repository.
//!
//! All state sits behind one async mutex, so every operation, including order
//! placement, runs as if in a serializable transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AdminDashboard, DepositScope, OrderScope, Page, Paged, ProductQuery, ProductStock, Repository, SellerDashboard,
    Settlement,
};
use crate::domain::aggregates::{
    Cart, CartItem, Category, CategorySummary, Deposit, DepositOutcome, NewCategory, NewProduct, NewReview,
    NewUser, Order, OrderStatus, Product, ProductImage, ProductUpdate, ProfileUpdate, Review, Role, User,
    WishlistItem,
};
use crate::domain::checkout::{plan_order, CheckoutLine};
use crate::domain::value_objects::{Email, Money, Quantity};
use crate::{Result, ShopError};

#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    images: Vec<ProductImage>,
    reviews: Vec<Review>,
    wishlist: Vec<WishlistItem>,
    carts: HashMap<Uuid, StoredCart>,
    orders: HashMap<Uuid, Order>,
    deposits: HashMap<Uuid, Deposit>,
}

struct StoredCart {
    id: Uuid,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    lines: Vec<StoredLine>,
}

struct StoredLine {
    id: Uuid,
    product_id: Uuid,
    quantity: Quantity,
}

impl State {
    fn line_view(&self, cart_id: Uuid, line: &StoredLine) -> Option<CartItem> {
        let product = self.products.get(&line.product_id)?;
        Some(CartItem {
            id: line.id,
            cart_id,
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity: line.quantity,
        })
    }

    fn cart_view(&self, cart: &StoredCart) -> Cart {
        Cart {
            id: cart.id,
            user_id: cart.user_id,
            created_at: cart.created_at,
            items: cart.lines.iter().filter_map(|l| self.line_view(cart.id, l)).collect(),
        }
    }

    fn category_summary(&self, category: &Category) -> CategorySummary {
        let count = self.products.values().filter(|p| p.category_id == Some(category.id)).count();
        CategorySummary::new(category, count as i64)
    }

    fn stock_rows<'a>(&self, products: impl Iterator<Item = &'a Product>) -> Vec<ProductStock> {
        let mut rows: Vec<ProductStock> = products
            .map(|p| ProductStock { id: p.id, name: p.name.clone(), seller_id: p.seller_id, stock: p.stock })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        rows
    }
}

impl MemoryRepository {
    pub fn new() -> Self { Self::default() }

    /// Overwrite a user's balance. Test fixtures use it to fund wallets
    /// without going through the gateway.
    pub async fn set_balance(&self, user_id: Uuid, balance: Money) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).ok_or(ShopError::NotFound("User"))?;
        user.balance = balance;
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: NewUser, role: Role) -> Result<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(ShopError::Conflict("A user with this email already exists".into()));
        }
        let user = user.into_user(role);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.values().find(|u| &u.email == email).cloned())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(&id).map(|user| {
            update.apply(user);
            user.clone()
        }))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(&id).map(|user| {
            user.role = role;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn list_categories(&self, page: Page) -> Result<Paged<CategorySummary>> {
        let state = self.state.lock().await;
        let mut all: Vec<CategorySummary> = state.categories.values().map(|c| state.category_summary(c)).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page.slice(all))
    }

    async fn category(&self, id: Uuid) -> Result<Option<CategorySummary>> {
        let state = self.state.lock().await;
        Ok(state.categories.get(&id).map(|c| state.category_summary(c)))
    }

    async fn create_category(&self, new: NewCategory) -> Result<Category> {
        let mut state = self.state.lock().await;
        if state.categories.values().any(|c| c.name == new.name) {
            return Err(ShopError::Conflict("A category with this name already exists".into()));
        }
        let category = Category { id: Uuid::now_v7(), name: new.name, description: new.description, created_at: Utc::now() };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, new: NewCategory) -> Result<Option<Category>> {
        let mut state = self.state.lock().await;
        if state.categories.values().any(|c| c.name == new.name && c.id != id) {
            return Err(ShopError::Conflict("A category with this name already exists".into()));
        }
        Ok(state.categories.get_mut(&id).map(|c| {
            c.name = new.name;
            c.description = new.description;
            c.clone()
        }))
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.categories.remove(&id).is_none() {
            return Ok(false);
        }
        for product in state.products.values_mut().filter(|p| p.category_id == Some(id)) {
            product.category_id = None;
        }
        Ok(true)
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Paged<Product>> {
        let state = self.state.lock().await;
        let mut matching: Vec<Product> = state.products.values().filter(|p| query.filter.matches(p)).cloned().collect();
        matching.sort_by(|a, b| query.ordering.compare(a, b));
        Ok(query.page.slice(matching))
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn create_product(&self, seller_id: Uuid, new: NewProduct) -> Result<Product> {
        let mut state = self.state.lock().await;
        if let Some(category_id) = new.category_id {
            if !state.categories.contains_key(&category_id) {
                return Err(ShopError::Validation("Unknown category".into()));
            }
        }
        let product = new.into_product(seller_id);
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, update: ProductUpdate) -> Result<Option<Product>> {
        let mut state = self.state.lock().await;
        if let Some(category_id) = update.category_id {
            if !state.categories.contains_key(&category_id) {
                return Err(ShopError::Validation("Unknown category".into()));
            }
        }
        Ok(state.products.get_mut(&id).map(|p| {
            update.apply(p);
            p.clone()
        }))
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.products.remove(&id).is_none() {
            return Ok(false);
        }
        state.images.retain(|i| i.product_id != id);
        state.reviews.retain(|r| r.product_id != id);
        state.wishlist.retain(|w| w.product_id != id);
        for cart in state.carts.values_mut() {
            cart.lines.retain(|l| l.product_id != id);
        }
        for item in state.orders.values_mut().flat_map(|o| o.items.iter_mut()) {
            if item.product_id == Some(id) {
                item.product_id = None;
            }
        }
        Ok(true)
    }

    async fn product_images(&self, product_id: Uuid) -> Result<Vec<ProductImage>> {
        let state = self.state.lock().await;
        Ok(state.images.iter().filter(|i| i.product_id == product_id).cloned().collect())
    }

    async fn add_product_image(&self, product_id: Uuid, url: String) -> Result<ProductImage> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&product_id) {
            return Err(ShopError::NotFound("Product"));
        }
        let image = ProductImage { id: Uuid::now_v7(), product_id, url, created_at: Utc::now() };
        state.images.push(image.clone());
        Ok(image)
    }

    async fn delete_product_image(&self, product_id: Uuid, image_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.images.len();
        state.images.retain(|i| !(i.id == image_id && i.product_id == product_id));
        Ok(state.images.len() != before)
    }

    async fn reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        let state = self.state.lock().await;
        Ok(state.reviews.iter().filter(|r| r.product_id == product_id).cloned().collect())
    }

    async fn review(&self, product_id: Uuid, review_id: Uuid) -> Result<Option<Review>> {
        let state = self.state.lock().await;
        Ok(state.reviews.iter().find(|r| r.id == review_id && r.product_id == product_id).cloned())
    }

    async fn create_review(&self, product_id: Uuid, user_id: Uuid, new: NewReview) -> Result<Review> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&product_id) {
            return Err(ShopError::NotFound("Product"));
        }
        let now = Utc::now();
        let review = Review {
            id: Uuid::now_v7(),
            product_id,
            user_id,
            ratings: new.ratings,
            comment: new.comment,
            created_at: now,
            updated_at: now,
        };
        state.reviews.push(review.clone());
        Ok(review)
    }

    async fn update_review(&self, review_id: Uuid, new: NewReview) -> Result<Option<Review>> {
        let mut state = self.state.lock().await;
        Ok(state.reviews.iter_mut().find(|r| r.id == review_id).map(|r| {
            r.ratings = new.ratings;
            r.comment = new.comment;
            r.updated_at = Utc::now();
            r.clone()
        }))
    }

    async fn delete_review(&self, review_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.reviews.len();
        state.reviews.retain(|r| r.id != review_id);
        Ok(state.reviews.len() != before)
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<WishlistItem> = state.wishlist.iter().filter(|w| w.user_id == user_id).cloned().collect();
        items.sort_by(|a, b| b.added_at.cmp(&a.added_at).then(b.id.cmp(&a.id)));
        Ok(items)
    }

    async fn wishlist_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<WishlistItem>> {
        let state = self.state.lock().await;
        Ok(state.wishlist.iter().find(|w| w.id == item_id && w.user_id == user_id).cloned())
    }

    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&product_id) {
            return Err(ShopError::NotFound("Product"));
        }
        if state.wishlist.iter().any(|w| w.user_id == user_id && w.product_id == product_id) {
            return Err(ShopError::Conflict("Product is already in the wishlist".into()));
        }
        let item = WishlistItem::new(user_id, product_id);
        state.wishlist.push(item.clone());
        Ok(item)
    }

    async fn remove_from_wishlist(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.wishlist.len();
        state.wishlist.retain(|w| !(w.id == item_id && w.user_id == user_id));
        Ok(state.wishlist.len() != before)
    }

    async fn cart_for_user(&self, user_id: Uuid) -> Result<Cart> {
        let mut state = self.state.lock().await;
        let existing = state.carts.values().find(|c| c.user_id == user_id).map(|c| c.id);
        let cart_id = match existing {
            Some(id) => id,
            None => {
                let fresh = Cart::new(user_id);
                let stored = StoredCart { id: fresh.id, user_id, created_at: fresh.created_at, lines: vec![] };
                state.carts.insert(stored.id, stored);
                fresh.id
            }
        };
        let cart = state.carts.get(&cart_id).ok_or(ShopError::NotFound("Cart"))?;
        Ok(state.cart_view(cart))
    }

    async fn cart(&self, cart_id: Uuid) -> Result<Option<Cart>> {
        let state = self.state.lock().await;
        Ok(state.carts.get(&cart_id).map(|c| state.cart_view(c)))
    }

    async fn add_cart_item(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity) -> Result<CartItem> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.products.contains_key(&product_id) {
            return Err(ShopError::NotFound("Product"));
        }
        let cart = state.carts.get_mut(&cart_id).ok_or(ShopError::NotFound("Cart"))?;
        let line_id = match cart.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                line.quantity = line.quantity.add(quantity);
                line.id
            }
            None => {
                let line = StoredLine { id: Uuid::now_v7(), product_id, quantity };
                let id = line.id;
                cart.lines.push(line);
                id
            }
        };
        let cart = state.carts.get(&cart_id).ok_or(ShopError::NotFound("Cart"))?;
        cart.lines
            .iter()
            .find(|l| l.id == line_id)
            .and_then(|l| state.line_view(cart_id, l))
            .ok_or(ShopError::NotFound("Cart item"))
    }

    async fn update_cart_item(&self, cart_id: Uuid, item_id: Uuid, quantity: Quantity) -> Result<Option<CartItem>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(cart) = state.carts.get_mut(&cart_id) else { return Ok(None) };
        let Some(line) = cart.lines.iter_mut().find(|l| l.id == item_id) else { return Ok(None) };
        line.quantity = quantity;
        let line = StoredLine { id: line.id, product_id: line.product_id, quantity };
        Ok(state.line_view(cart_id, &line))
    }

    async fn remove_cart_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(cart) = state.carts.get_mut(&cart_id) else { return Ok(false) };
        let before = cart.lines.len();
        cart.lines.retain(|l| l.id != item_id);
        Ok(cart.lines.len() != before)
    }

    async fn place_order(&self, user_id: Uuid, cart_id: Uuid) -> Result<Order> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let cart = state.carts.get(&cart_id).ok_or(ShopError::NotFound("Cart"))?;
        if cart.user_id != user_id {
            return Err(ShopError::Forbidden("You can only order from your own cart".into()));
        }
        let buyer = state.users.get(&user_id).ok_or(ShopError::NotFound("User"))?;
        let lines = cart
            .lines
            .iter()
            .map(|l| -> Result<CheckoutLine> {
                let p = state.products.get(&l.product_id).ok_or(ShopError::NotFound("Product"))?;
                Ok(CheckoutLine {
                    product_id: p.id,
                    seller_id: p.seller_id,
                    product_name: p.name.clone(),
                    price: p.price,
                    stock: p.stock,
                    quantity: l.quantity,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let plan = plan_order(buyer, &lines)?;

        let now = Utc::now();
        let order = plan.to_order(user_id, now);
        if let Some(buyer) = state.users.get_mut(&user_id) {
            buyer.balance = plan.remaining_balance;
            buyer.updated_at = now;
        }
        for (product_id, stock) in &plan.remaining_stock {
            if let Some(product) = state.products.get_mut(product_id) {
                product.stock = *stock;
                product.updated_at = now;
            }
        }
        state.carts.remove(&cart_id);
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn orders(&self, scope: OrderScope, page: Page) -> Result<Paged<Order>> {
        let state = self.state.lock().await;
        let mut matching: Vec<Order> = state
            .orders
            .values()
            .filter(|o| match scope {
                OrderScope::All => true,
                OrderScope::Seller(seller) => o.involves_seller(seller),
                OrderScope::Buyer(buyer) => o.belongs_to(buyer),
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page.slice(matching))
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<Order> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let order = state.orders.get_mut(&id).ok_or(ShopError::NotFound("Order"))?;
        if order.status != from {
            return Err(ShopError::Conflict(format!("Order is now {}", order.status)));
        }
        let refunded = match (to, state.users.get(&order.user_id)) {
            (OrderStatus::Canceled, Some(buyer)) => Some(buyer.balance.checked_add(order.total_price)?),
            _ => None,
        };
        let now = Utc::now();
        order.status = to;
        order.updated_at = now;
        let order = order.clone();

        if to == OrderStatus::Canceled {
            if let (Some(balance), Some(buyer)) = (refunded, state.users.get_mut(&order.user_id)) {
                buyer.balance = balance;
                buyer.updated_at = now;
            }
            for item in &order.items {
                if let Some(product) = item.product_id.and_then(|pid| state.products.get_mut(&pid)) {
                    product.stock += item.quantity.value();
                    product.updated_at = now;
                }
            }
        }
        Ok(order)
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.orders.remove(&id).is_some())
    }

    async fn create_deposit(&self, user_id: Uuid, amount: Money) -> Result<Deposit> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) {
            return Err(ShopError::NotFound("User"));
        }
        let deposit = Deposit::pending(user_id, amount);
        state.deposits.insert(deposit.id, deposit.clone());
        Ok(deposit)
    }

    async fn deposits(&self, scope: DepositScope, page: Page) -> Result<Paged<Deposit>> {
        let state = self.state.lock().await;
        let mut matching: Vec<Deposit> = state
            .deposits
            .values()
            .filter(|d| match scope {
                DepositScope::All => true,
                DepositScope::User(user_id) => d.user_id == user_id,
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page.slice(matching))
    }

    async fn deposit(&self, id: Uuid) -> Result<Option<Deposit>> {
        Ok(self.state.lock().await.deposits.get(&id).cloned())
    }

    async fn settle_deposit(&self, id: Uuid, outcome: DepositOutcome) -> Result<Settlement> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let deposit = state.deposits.get_mut(&id).ok_or(ShopError::NotFound("Deposit"))?;
        if !deposit.is_pending() {
            return Ok(Settlement { deposit: deposit.clone(), applied: false });
        }
        let credited = match outcome {
            DepositOutcome::Completed => {
                let user = state.users.get(&deposit.user_id).ok_or(ShopError::NotFound("User"))?;
                Some(user.balance.checked_add(deposit.amount)?)
            }
            DepositOutcome::Failed => None,
        };
        let now = Utc::now();
        deposit.status = outcome.into();
        deposit.updated_at = now;
        let deposit = deposit.clone();
        if let (Some(balance), Some(user)) = (credited, state.users.get_mut(&deposit.user_id)) {
            user.balance = balance;
            user.updated_at = now;
        }
        Ok(Settlement { deposit, applied: true })
    }

    async fn delete_deposit(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.deposits.remove(&id).is_some())
    }

    async fn admin_dashboard(&self) -> Result<AdminDashboard> {
        let state = self.state.lock().await;
        Ok(AdminDashboard {
            total_products: state.products.len() as i64,
            total_orders: state.orders.len() as i64,
            products: state.stock_rows(state.products.values()),
        })
    }

    async fn seller_dashboard(&self, seller_id: Uuid) -> Result<SellerDashboard> {
        let state = self.state.lock().await;
        let own = state.products.values().filter(|p| p.seller_id == seller_id);
        let live_orders = state.orders.values().filter(|o| o.status != OrderStatus::Canceled);
        let (total_sales, total_revenue) = live_orders
            .flat_map(|o| o.items.iter())
            .filter(|i| i.seller_id == seller_id)
            .fold((0_i64, Decimal::new(0, 2)), |(n, sum), i| (n + 1, sum + i.total_price.amount()));
        let products = state.stock_rows(own);
        Ok(SellerDashboard { total_products: products.len() as i64, total_sales, total_revenue, products })
    }
}
