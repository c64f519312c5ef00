//! PostgreSQL repository.
//!
//! Multi-row operations run inside one transaction. Order placement locks the
//! cart, the buyer and every product in the cart with `FOR UPDATE` before the
//! checkout rules are evaluated; status changes and deposit settlement are
//! compare-and-set updates, so their side effects apply at most once.

use async_trait::async_trait;
use rust_decimal::Decimal;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::{
    AdminDashboard, DepositScope, OrderScope, Page, Paged, ProductQuery, ProductStock, Repository, SellerDashboard,
    Settlement,
};
use crate::domain::aggregates::product::ProductFilter;
use crate::domain::aggregates::{
    Cart, CartItem, Category, CategorySummary, Deposit, DepositOutcome, DepositStatus, NewCategory, NewProduct,
    NewReview, NewUser, Order, OrderItem, OrderStatus, Product, ProductImage, ProductUpdate, ProfileUpdate, Review,
    Role, User, WishlistItem,
};
use crate::domain::checkout::{plan_order, CheckoutLine};
use crate::domain::value_objects::{Email, Money, Quantity};
use crate::{Result, ShopError};

const CART_ITEM_COLUMNS: &str = "SELECT ci.id, ci.cart_id, ci.product_id, p.name AS product_name, \
     p.price AS unit_price, ci.quantity FROM cart_items ci JOIN products p ON p.id = ci.product_id";

const CATEGORY_SUMMARY_COLUMNS: &str = "SELECT c.id, c.name, c.description, COUNT(p.id) AS product_count \
     FROM categories c LEFT JOIN products p ON p.category_id = c.id";

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ShopError::Internal(format!("migration failed: {e}")))
    }

    async fn cart_items(&self, cart_id: Uuid) -> Result<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(&format!(
            "{CART_ITEM_COLUMNS} WHERE ci.cart_id = $1 ORDER BY ci.added_at, ci.id"
        ))
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn cart_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<Option<CartItem>> {
        let item = sqlx::query_as::<_, CartItem>(&format!("{CART_ITEM_COLUMNS} WHERE ci.cart_id = $1 AND ci.id = $2"))
            .bind(cart_id)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    async fn attach_items(&self, orders: &mut [Order]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY product_name, id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }
        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn stock_rows(&self, seller_id: Option<Uuid>) -> Result<Vec<ProductStock>> {
        let rows = sqlx::query_as::<_, ProductStock>(
            "SELECT id, name, seller_id, stock FROM products \
             WHERE ($1::uuid IS NULL OR seller_id = $1) ORDER BY name, id",
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Translate constraint violations into domain errors.
fn constraint_error(err: sqlx::Error, conflict: &str, missing: &'static str) -> ShopError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return ShopError::Conflict(conflict.to_string());
        }
        if db.is_foreign_key_violation() {
            return ShopError::NotFound(missing);
        }
    }
    ShopError::from(err)
}

fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE TRUE");
    if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
        let pattern = like_pattern(term.trim());
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(seller_id) = filter.seller_id {
        qb.push(" AND seller_id = ").push_bind(seller_id);
    }
    if let Some(min) = filter.price_min {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.price_max {
        qb.push(" AND price <= ").push_bind(max);
    }
}

fn push_order_scope(qb: &mut QueryBuilder<'_, Postgres>, scope: OrderScope) {
    match scope {
        OrderScope::All => {}
        OrderScope::Seller(seller_id) => {
            qb.push(" WHERE EXISTS (SELECT 1 FROM order_items oi WHERE oi.order_id = orders.id AND oi.seller_id = ")
                .push_bind(seller_id)
                .push(")");
        }
        OrderScope::Buyer(user_id) => {
            qb.push(" WHERE user_id = ").push_bind(user_id);
        }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_user(&self, user: NewUser, role: Role) -> Result<User> {
        let user = user.into_user(role);
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, address, phone_number, balance, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.address)
        .bind(&user.phone_number)
        .bind(user.balance)
        .bind(user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "A user with this email already exists", "User"))
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "UPDATE users SET first_name = COALESCE($2, first_name), last_name = COALESCE($3, last_name), \
             address = COALESCE($4, address), phone_number = COALESCE($5, phone_number), updated_at = NOW() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(update.address)
        .bind(update.phone_number)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_categories(&self, page: Page) -> Result<Paged<CategorySummary>> {
        let items = sqlx::query_as::<_, CategorySummary>(&format!(
            "{CATEGORY_SUMMARY_COLUMNS} GROUP BY c.id ORDER BY c.name LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories").fetch_one(&self.pool).await?;
        Ok(Paged { items, total: total.0 })
    }

    async fn category(&self, id: Uuid) -> Result<Option<CategorySummary>> {
        Ok(sqlx::query_as::<_, CategorySummary>(&format!("{CATEGORY_SUMMARY_COLUMNS} WHERE c.id = $1 GROUP BY c.id"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_category(&self, new: NewCategory) -> Result<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, description, created_at) VALUES ($1, $2, $3, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.name)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "A category with this name already exists", "Category"))
    }

    async fn update_category(&self, id: Uuid, new: NewCategory) -> Result<Option<Category>> {
        sqlx::query_as::<_, Category>("UPDATE categories SET name = $2, description = $3 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(&new.name)
            .bind(&new.description)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| constraint_error(e, "A category with this name already exists", "Category"))
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Paged<Product>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM products");
        push_product_filters(&mut qb, &query.filter);
        qb.push(" ORDER BY ")
            .push(query.ordering.sql())
            .push(" LIMIT ")
            .push_bind(query.page.limit())
            .push(" OFFSET ")
            .push_bind(query.page.offset());
        let items = qb.build_query_as::<Product>().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, &query.filter);
        let total: (i64,) = count.build_query_as().fetch_one(&self.pool).await?;
        Ok(Paged { items, total: total.0 })
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn create_product(&self, seller_id: Uuid, new: NewProduct) -> Result<Product> {
        let p = new.into_product(seller_id);
        sqlx::query_as::<_, Product>(
            "INSERT INTO products (id, name, description, price, stock, category_id, seller_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.description)
        .bind(p.price)
        .bind(p.stock)
        .bind(p.category_id)
        .bind(p.seller_id)
        .bind(p.created_at)
        .bind(p.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match constraint_error(e, "Product already exists", "Category") {
            ShopError::NotFound(_) => ShopError::Validation("Unknown category".into()),
            other => other,
        })
    }

    async fn update_product(&self, id: Uuid, update: ProductUpdate) -> Result<Option<Product>> {
        sqlx::query_as::<_, Product>(
            "UPDATE products SET name = COALESCE($2, name), description = COALESCE($3, description), \
             price = COALESCE($4, price), stock = COALESCE($5, stock), category_id = COALESCE($6, category_id), \
             updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(update.name)
        .bind(update.description)
        .bind(update.price)
        .bind(update.stock)
        .bind(update.category_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match constraint_error(e, "Product already exists", "Category") {
            ShopError::NotFound(_) => ShopError::Validation("Unknown category".into()),
            other => other,
        })
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn product_images(&self, product_id: Uuid) -> Result<Vec<ProductImage>> {
        Ok(sqlx::query_as::<_, ProductImage>(
            "SELECT * FROM product_images WHERE product_id = $1 ORDER BY created_at, id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_product_image(&self, product_id: Uuid, url: String) -> Result<ProductImage> {
        sqlx::query_as::<_, ProductImage>(
            "INSERT INTO product_images (id, product_id, url, created_at) VALUES ($1, $2, $3, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(product_id)
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Image already exists", "Product"))
    }

    async fn delete_product_image(&self, product_id: Uuid, image_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM product_images WHERE id = $1 AND product_id = $2")
            .bind(image_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        Ok(sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at, id")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn review(&self, product_id: Uuid, review_id: Uuid) -> Result<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1 AND product_id = $2")
            .bind(review_id)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_review(&self, product_id: Uuid, user_id: Uuid, new: NewReview) -> Result<Review> {
        sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (id, product_id, user_id, ratings, comment, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(product_id)
        .bind(user_id)
        .bind(new.ratings)
        .bind(new.comment)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Review already exists", "Product"))
    }

    async fn update_review(&self, review_id: Uuid, new: NewReview) -> Result<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            "UPDATE reviews SET ratings = $2, comment = $3, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(review_id)
        .bind(new.ratings)
        .bind(new.comment)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_review(&self, review_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM reviews WHERE id = $1").bind(review_id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>> {
        Ok(sqlx::query_as::<_, WishlistItem>(
            "SELECT * FROM wishlist_items WHERE user_id = $1 ORDER BY added_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn wishlist_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<WishlistItem>> {
        Ok(sqlx::query_as::<_, WishlistItem>("SELECT * FROM wishlist_items WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem> {
        let item = WishlistItem::new(user_id, product_id);
        sqlx::query_as::<_, WishlistItem>(
            "INSERT INTO wishlist_items (id, user_id, product_id, added_at) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(item.id)
        .bind(item.user_id)
        .bind(item.product_id)
        .bind(item.added_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Product is already in the wishlist", "Product"))
    }

    async fn remove_from_wishlist(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM wishlist_items WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn cart_for_user(&self, user_id: Uuid) -> Result<Cart> {
        sqlx::query("INSERT INTO carts (id, user_id, created_at) VALUES ($1, $2, NOW()) ON CONFLICT (user_id) DO NOTHING")
            .bind(Uuid::now_v7())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| constraint_error(e, "Cart already exists", "User"))?;
        let mut cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        cart.items = self.cart_items(cart.id).await?;
        Ok(cart)
    }

    async fn cart(&self, cart_id: Uuid) -> Result<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE id = $1")
            .bind(cart_id)
            .fetch_optional(&self.pool)
            .await?;
        match cart {
            Some(mut cart) => {
                cart.items = self.cart_items(cart.id).await?;
                Ok(Some(cart))
            }
            None => Ok(None),
        }
    }

    async fn add_cart_item(&self, cart_id: Uuid, product_id: Uuid, quantity: Quantity) -> Result<CartItem> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists.0 {
            return Err(ShopError::NotFound("Product"));
        }
        let (item_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO cart_items (id, cart_id, product_id, quantity, added_at) VALUES ($1, $2, $3, $4, NOW()) \
             ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity \
             RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Cart item already exists", "Cart"))?;
        self.cart_item(cart_id, item_id).await?.ok_or(ShopError::NotFound("Cart item"))
    }

    async fn update_cart_item(&self, cart_id: Uuid, item_id: Uuid, quantity: Quantity) -> Result<Option<CartItem>> {
        let done = sqlx::query("UPDATE cart_items SET quantity = $3 WHERE id = $2 AND cart_id = $1")
            .bind(cart_id)
            .bind(item_id)
            .bind(quantity)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Ok(None);
        }
        self.cart_item(cart_id, item_id).await
    }

    async fn remove_cart_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM cart_items WHERE id = $2 AND cart_id = $1")
            .bind(cart_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn place_order(&self, user_id: Uuid, cart_id: Uuid) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<(Uuid,)> = sqlx::query_as("SELECT user_id FROM carts WHERE id = $1 FOR UPDATE")
            .bind(cart_id)
            .fetch_optional(&mut *tx)
            .await?;
        let (owner,) = owner.ok_or(ShopError::NotFound("Cart"))?;
        if owner != user_id {
            return Err(ShopError::Forbidden("You can only order from your own cart".into()));
        }

        let buyer = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ShopError::NotFound("User"))?;

        let lines = sqlx::query_as::<_, CheckoutLine>(
            "SELECT p.id AS product_id, p.seller_id, p.name AS product_name, p.price, p.stock, ci.quantity \
             FROM cart_items ci JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = $1 ORDER BY p.id FOR UPDATE OF p",
        )
        .bind(cart_id)
        .fetch_all(&mut *tx)
        .await?;

        // Dropping `tx` on an early return rolls everything back.
        let plan = plan_order(&buyer, &lines)?;
        let order = plan.to_order(user_id, Utc::now());

        sqlx::query("UPDATE users SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(plan.remaining_balance)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO orders (id, user_id, status, total_price, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status)
        .bind(order.total_price)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        let mut items = QueryBuilder::<Postgres>::new(
            "INSERT INTO order_items (id, order_id, product_id, seller_id, product_name, quantity, price, total_price) ",
        );
        items.push_values(order.items.iter(), |mut row, item| {
            row.push_bind(item.id)
                .push_bind(item.order_id)
                .push_bind(item.product_id)
                .push_bind(item.seller_id)
                .push_bind(item.product_name.clone())
                .push_bind(item.quantity)
                .push_bind(item.price)
                .push_bind(item.total_price);
        });
        items.build().execute(&mut *tx).await?;

        for (product_id, stock) in &plan.remaining_stock {
            sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
                .bind(product_id)
                .bind(stock)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM carts WHERE id = $1").bind(cart_id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn orders(&self, scope: OrderScope, page: Page) -> Result<Paged<Order>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM orders");
        push_order_scope(&mut qb, scope);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let mut items = qb.build_query_as::<Order>().fetch_all(&self.pool).await?;
        self.attach_items(&mut items).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_order_scope(&mut count, scope);
        let total: (i64,) = count.build_query_as().fetch_one(&self.pool).await?;
        Ok(Paged { items, total: total.0 })
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(order) = order else { return Ok(None) };
        let mut orders = [order];
        self.attach_items(&mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2 RETURNING *",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut order) = updated else {
            let current: Option<(OrderStatus,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            return match current {
                None => Err(ShopError::NotFound("Order")),
                Some((status,)) => Err(ShopError::Conflict(format!("Order is now {status}"))),
            };
        };

        if to == OrderStatus::Canceled {
            sqlx::query("UPDATE users SET balance = balance + $2, updated_at = NOW() WHERE id = $1")
                .bind(order.user_id)
                .bind(order.total_price)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE products p SET stock = p.stock + oi.quantity, updated_at = NOW() \
                 FROM order_items oi WHERE oi.order_id = $1 AND oi.product_id = p.id",
            )
            .bind(order.id)
            .execute(&mut *tx)
            .await?;
        }

        order.items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_name, id")
            .bind(order.id)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn create_deposit(&self, user_id: Uuid, amount: Money) -> Result<Deposit> {
        let d = Deposit::pending(user_id, amount);
        sqlx::query_as::<_, Deposit>(
            "INSERT INTO deposits (id, user_id, amount, status, transaction_reference, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(d.id)
        .bind(d.user_id)
        .bind(d.amount)
        .bind(d.status)
        .bind(&d.transaction_reference)
        .bind(d.created_at)
        .bind(d.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Deposit reference already used", "User"))
    }

    async fn deposits(&self, scope: DepositScope, page: Page) -> Result<Paged<Deposit>> {
        let user_id = match scope {
            DepositScope::All => None,
            DepositScope::User(id) => Some(id),
        };
        let items = sqlx::query_as::<_, Deposit>(
            "SELECT * FROM deposits WHERE ($1::uuid IS NULL OR user_id = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM deposits WHERE ($1::uuid IS NULL OR user_id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Paged { items, total: total.0 })
    }

    async fn deposit(&self, id: Uuid) -> Result<Option<Deposit>> {
        Ok(sqlx::query_as::<_, Deposit>("SELECT * FROM deposits WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn settle_deposit(&self, id: Uuid, outcome: DepositOutcome) -> Result<Settlement> {
        let mut tx = self.pool.begin().await?;
        let settled = sqlx::query_as::<_, Deposit>(
            "UPDATE deposits SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3 RETURNING *",
        )
        .bind(id)
        .bind(DepositStatus::from(outcome))
        .bind(DepositStatus::Pending)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(deposit) = settled else {
            let existing = sqlx::query_as::<_, Deposit>("SELECT * FROM deposits WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(ShopError::NotFound("Deposit"))?;
            return Ok(Settlement { deposit: existing, applied: false });
        };

        if outcome == DepositOutcome::Completed {
            sqlx::query("UPDATE users SET balance = balance + $2, updated_at = NOW() WHERE id = $1")
                .bind(deposit.user_id)
                .bind(deposit.amount)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(Settlement { deposit, applied: true })
    }

    async fn delete_deposit(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM deposits WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn admin_dashboard(&self) -> Result<AdminDashboard> {
        let (total_products,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products").fetch_one(&self.pool).await?;
        let (total_orders,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders").fetch_one(&self.pool).await?;
        let products = self.stock_rows(None).await?;
        Ok(AdminDashboard { total_products, total_orders, products })
    }

    async fn seller_dashboard(&self, seller_id: Uuid) -> Result<SellerDashboard> {
        let (total_sales, total_revenue): (i64, Decimal) = sqlx::query_as(
            "SELECT COUNT(oi.id), COALESCE(SUM(oi.total_price), 0::numeric(12, 2)) FROM order_items oi \
             JOIN orders o ON o.id = oi.order_id WHERE oi.seller_id = $1 AND o.status <> $2",
        )
        .bind(seller_id)
        .bind(OrderStatus::Canceled)
        .fetch_one(&self.pool)
        .await?;
        let products = self.stock_rows(Some(seller_id)).await?;
        Ok(SellerDashboard { total_products: products.len() as i64, total_sales, total_revenue, products })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rice"), "%rice%");
        assert_eq!(like_pattern("100%_pure"), "%100\\%\\_pure%");
    }

    #[test]
    fn test_filters_only_bind_what_is_set() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM products");
        push_product_filters(&mut qb, &ProductFilter { category_id: Some(Uuid::nil()), ..Default::default() });
        assert_eq!(qb.sql(), "SELECT * FROM products WHERE TRUE AND category_id = $1");
    }
}
