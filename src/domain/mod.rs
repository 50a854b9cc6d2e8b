//! Domain types: resource records, cache validators and key validation.

pub mod cache_meta;
pub mod character;
pub mod error;
pub mod key;
