//! Core data types for the gas alert bot.

pub mod price;
pub mod snapshot;

pub use price::*;
pub use snapshot::*;
