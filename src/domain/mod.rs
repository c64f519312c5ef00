//! Domain model: value objects, aggregates, events and the checkout rules.
pub mod aggregates;
pub mod checkout;
pub mod events;
pub mod value_objects;
