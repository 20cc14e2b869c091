//! Collaborator traits: the engine only ever talks to the chain through these.

pub mod feed;
pub mod gateway;

pub use feed::TransactionFeed;
pub use gateway::DelegationGateway;
