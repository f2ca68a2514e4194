//! Gas price collection from the Etherscan oracle.
//!
//! ## Architecture
//!
//! - `oracle` - `PriceOracle` trait and the Etherscan REST client
//! - `poller` - periodic fetch-and-derive cycle publishing `PriceSnapshot`s
//! - `error` - fetch errors (`FeedError`)

pub mod error;
pub mod oracle;
pub mod poller;

pub use error::*;
pub use oracle::*;
pub use poller::*;
