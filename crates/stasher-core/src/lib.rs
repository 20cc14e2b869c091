//! # Stasher Core
//!
//! Shared building blocks for Energy Stasher: configuration, the error type,
//! the external collaborator traits (delegation gateway, transaction feed)
//! and the plain data types that flow between crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::StasherConfig;
pub use error::{Result, StasherError};
pub use traits::{DelegationGateway, TransactionFeed};
pub use types::{FeedTransaction, ResourceKind, SUN_PER_TRX, TxId};
