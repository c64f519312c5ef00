//! Application services: the use cases the HTTP layer calls into.

pub mod auth;
pub mod deposits;
pub mod events;
pub mod notifications;
pub mod orders;
pub mod payments;

pub use auth::AuthService;
pub use events::EventPublisher;
pub use payments::{PaymentGateway, SslCommerzGateway, UnconfiguredGateway};
