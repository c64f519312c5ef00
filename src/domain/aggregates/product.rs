//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i32,
    pub category_id: Option<Uuid>,
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct ProductImage {
    pub id: Uuid,
    pub product_id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub ratings: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewReview {
    #[validate(range(min = 1, max = 5))]
    pub ratings: i32,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub comment: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub stock: i32,
    pub category_id: Option<Uuid>,
}

impl NewProduct {
    pub fn into_product(self, seller_id: Uuid) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::now_v7(),
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
            category_id: self.category_id,
            seller_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial product update. The seller is fixed at creation.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProductUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub category_id: Option<Uuid>,
}

impl ProductUpdate {
    pub fn apply(self, product: &mut Product) {
        if let Some(v) = self.name { product.name = v; }
        if let Some(v) = self.description { product.description = v; }
        if let Some(v) = self.price { product.price = v; }
        if let Some(v) = self.stock { product.stock = v; }
        if let Some(v) = self.category_id { product.category_id = Some(v); }
        product.updated_at = Utc::now();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    Price,
    Name,
    UpdatedAt,
    CreatedAt,
}

/// Catalog ordering, parsed from `price`, `-price`, `name`, `updated_at` and so on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProductOrdering {
    pub field: SortField,
    pub descending: bool,
}

impl Default for ProductOrdering {
    fn default() -> Self { Self { field: SortField::CreatedAt, descending: true } }
}

impl ProductOrdering {
    pub fn parse(value: &str) -> Option<Self> {
        let (descending, name) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let field = match name {
            "price" => SortField::Price,
            "name" => SortField::Name,
            "updated_at" => SortField::UpdatedAt,
            "created_at" => SortField::CreatedAt,
            _ => return None,
        };
        Some(Self { field, descending })
    }

    pub fn sql(&self) -> &'static str {
        match (self.field, self.descending) {
            (SortField::Price, false) => "price ASC, id ASC",
            (SortField::Price, true) => "price DESC, id ASC",
            (SortField::Name, false) => "name ASC, id ASC",
            (SortField::Name, true) => "name DESC, id ASC",
            (SortField::UpdatedAt, false) => "updated_at ASC, id ASC",
            (SortField::UpdatedAt, true) => "updated_at DESC, id ASC",
            (SortField::CreatedAt, false) => "created_at ASC, id ASC",
            (SortField::CreatedAt, true) => "created_at DESC, id ASC",
        }
    }

    pub fn compare(&self, a: &Product, b: &Product) -> Ordering {
        let ord = match self.field {
            SortField::Price => a.price.cmp(&b.price),
            SortField::Name => a.name.cmp(&b.name),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        };
        let ord = if self.descending { ord.reverse() } else { ord };
        ord.then_with(|| a.id.cmp(&b.id))
    }
}

/// Catalog filter. `seller_id` is set when a seller browses, limiting them to their own listings.
#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub price_min: Option<Money>,
    pub price_max: Option<Money>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(term) = self.search.as_deref() {
            let term = term.to_lowercase();
            if !product.name.to_lowercase().contains(&term)
                && !product.description.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        if self.category_id.is_some() && product.category_id != self.category_id { return false; }
        if self.seller_id.is_some_and(|s| s != product.seller_id) { return false; }
        if self.price_min.is_some_and(|min| product.price < min) { return false; }
        if self.price_max.is_some_and(|max| product.price > max) { return false; }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn product(name: &str, price: i64) -> Product {
        NewProduct {
            name: name.into(),
            description: "fresh".into(),
            price: Money::new(Decimal::new(price, 0)).unwrap(),
            stock: 4,
            category_id: None,
        }
        .into_product(Uuid::now_v7())
    }

    #[test]
    fn test_ordering_parse() {
        assert_eq!(ProductOrdering::parse("-price"), Some(ProductOrdering { field: SortField::Price, descending: true }));
        assert_eq!(ProductOrdering::parse("name").map(|o| o.descending), Some(false));
        assert_eq!(ProductOrdering::parse("stock"), None);
    }

    #[test]
    fn test_ordering_compare() {
        let mut items = vec![product("Rice", 80), product("Apple", 120), product("Milk", 60)];
        items.sort_by(|a, b| ProductOrdering::parse("-price").unwrap().compare(a, b));
        assert_eq!(items.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), ["Apple", "Rice", "Milk"]);
        items.sort_by(|a, b| ProductOrdering::parse("name").unwrap().compare(a, b));
        assert_eq!(items[0].name, "Apple");
    }

    #[test]
    fn test_filter() {
        let rice = product("Basmati Rice", 80);
        let filter = ProductFilter { search: Some("rice".into()), ..Default::default() };
        assert!(filter.matches(&rice));
        let filter = ProductFilter { price_max: Some(Money::new(Decimal::new(50, 0)).unwrap()), ..Default::default() };
        assert!(!filter.matches(&rice));
        let filter = ProductFilter { seller_id: Some(Uuid::now_v7()), ..Default::default() };
        assert!(!filter.matches(&rice));
    }

    #[test]
    fn test_update_apply() {
        let mut p = product("Eggs", 10);
        ProductUpdate { stock: Some(9), ..Default::default() }.apply(&mut p);
        assert_eq!(p.stock, 9);
        assert_eq!(p.name, "Eggs");
    }
}
