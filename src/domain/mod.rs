//! Order records, their decoding and their validation rules.

pub mod error;
pub mod order;
pub mod validation;

pub use error::DomainError;
pub use order::{Delivery, Item, Order, OrderUid, Payment};
pub use validation::{Problems, validate};
