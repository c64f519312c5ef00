//! Grocera marketplace backend
//!
//! REST API for a multi-seller grocery store.
//!
//! ## Features
//! - Product catalog with categories, images and reviews
//! - Per-user cart and wishlist
//! - Wallet-funded order placement
//! - Order fulfilment workflow for sellers and staff
//! - Wallet deposits reconciled through a hosted payment gateway

pub mod config;
pub mod domain;
pub mod http;
pub mod permissions;
pub mod repository;
pub mod services;

use thiserror::Error;

use crate::domain::checkout::CheckoutError;
use crate::domain::aggregates::order::TransitionError;
use crate::domain::value_objects::ValueError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// SQLSTATE `numeric_value_out_of_range`: a balance or total left the
/// `NUMERIC(10, 2)` range.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

impl From<sqlx::Error> for ShopError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) {
                return Self::Value(ValueError::TooLarge);
            }
        }
        Self::Database(err)
    }
}

impl From<validator::ValidationErrors> for ShopError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;
