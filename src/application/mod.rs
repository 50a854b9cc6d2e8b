//! Application services: the cache-aside engine, the resources it serves and the error boundary.

pub mod cache_aside;
pub mod characters;
pub mod error;
pub mod repos;
pub mod resource;
pub mod search;
