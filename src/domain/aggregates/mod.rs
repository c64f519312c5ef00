//! Aggregates module
pub mod cart;
pub mod category;
pub mod deposit;
pub mod order;
pub mod product;
pub mod user;
pub mod wishlist;

pub use cart::{Cart, CartItem};
pub use category::{Category, CategorySummary, NewCategory};
pub use deposit::{Deposit, DepositOutcome, DepositStatus};
pub use order::{Order, OrderItem, OrderStatus, TransitionError};
pub use product::{NewProduct, NewReview, Product, ProductImage, ProductUpdate, Review};
pub use user::{NewUser, ProfileUpdate, Role, User};
pub use wishlist::WishlistItem;
