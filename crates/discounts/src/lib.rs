//! Discount codes: capped, optionally expiring, redeemed atomically.

pub mod code;

pub use code::{
    discounted_price, normalize_code, Discount, DiscountCode, DiscountKind, DiscountRegistry,
    InMemoryDiscountRegistry,
};
