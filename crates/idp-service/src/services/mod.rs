//! Business logic layer.

pub mod token_issuer;
