//! Small shared helpers: time and randomness sources, lock recovery.

pub mod clock;
pub(crate) mod lock;
