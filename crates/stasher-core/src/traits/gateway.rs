//! Resource delegation gateway trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::TxId;

/// Opaque delegate / undelegate RPC against the chain.
///
/// Query results are in sun, the node's native unit. Delegate and undelegate
/// take whole TRX; implementations convert with [`crate::SUN_PER_TRX`].
#[async_trait]
pub trait DelegationGateway: Send + Sync {
    /// Gateway name (for logs).
    fn name(&self) -> &str;

    /// Largest amount `owner` can currently delegate, in sun.
    async fn max_delegatable(&self, owner: &str) -> Result<u64>;

    /// Amount currently delegated from `owner` to `receiver`, in sun.
    async fn active_delegation(&self, owner: &str, receiver: &str) -> Result<u64>;

    /// Delegate `amount_trx` worth of resource to `receiver`.
    async fn delegate(&self, owner: &str, receiver: &str, amount_trx: u64) -> Result<TxId>;

    /// Reclaim `amount_trx` worth of resource from `receiver`.
    async fn undelegate(&self, owner: &str, receiver: &str, amount_trx: u64) -> Result<TxId>;
}
