//! User Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::value_objects::{Email, Money};

/// Marketplace role. Admins are the staff accounts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum Role {
    #[default]
    Buyer,
    Seller,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buyer => write!(f, "buyer"),
            Self::Seller => write!(f, "seller"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Email,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub balance: Money,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// An address made of whitespace does not count.
    pub fn has_address(&self) -> bool {
        self.address.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub address: Option<String>,
    pub phone_number: Option<String>,
}

impl NewUser {
    pub fn into_user(self, role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::now_v7(),
            email: self.email,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            address: self.address,
            phone_number: self.phone_number,
            balance: Money::ZERO,
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Profile fields a user may change themselves. Balance and role are not among them.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
}

impl ProfileUpdate {
    pub fn apply(self, user: &mut User) {
        if let Some(v) = self.first_name { user.first_name = v; }
        if let Some(v) = self.last_name { user.last_name = v; }
        if let Some(v) = self.address { user.address = Some(v); }
        if let Some(v) = self.phone_number { user.phone_number = Some(v); }
        user.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(address: Option<&str>) -> User {
        NewUser {
            email: Email::parse("ana@example.com").unwrap(),
            password_hash: String::new(),
            first_name: "Ana".into(),
            last_name: "Silva".into(),
            address: address.map(String::from),
            phone_number: None,
        }
        .into_user(Role::Buyer)
    }

    #[test]
    fn test_has_address() {
        assert!(user(Some("12 Lake Road")).has_address());
        assert!(!user(Some("   ")).has_address());
        assert!(!user(None).has_address());
    }

    #[test]
    fn test_profile_update_keeps_unset_fields() {
        let mut u = user(None);
        ProfileUpdate { address: Some("Dhanmondi 27".into()), ..Default::default() }.apply(&mut u);
        assert_eq!(u.address.as_deref(), Some("Dhanmondi 27"));
        assert_eq!(u.first_name, "Ana");
        assert!(u.balance.is_zero());
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let mut u = user(None);
        u.password_hash = "$2b$04$secret".into();
        let json = serde_json::to_value(&u).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "buyer");
    }
}
