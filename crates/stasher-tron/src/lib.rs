//! # Stasher Tron
//!
//! HTTP implementations of the collaborator traits:
//! - [`TronGateway`]: TronGrid build → external signer → broadcast, plus
//!   max-delegatable and active-delegation queries.
//! - [`TronScanFeed`]: recent account transactions from TronScan.
//!
//! Transactions are never built or signed locally: the node builds them and
//! the signer service holds the key.

pub mod api;
pub mod feed;
pub mod gateway;

pub use feed::TronScanFeed;
pub use gateway::TronGateway;
