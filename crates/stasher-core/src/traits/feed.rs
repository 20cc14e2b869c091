//! Transaction history feed trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::FeedTransaction;

/// Recency-ordered transaction history of an account.
#[async_trait]
pub trait TransactionFeed: Send + Sync {
    /// Most recent `limit` transactions touching `account`, newest first.
    async fn recent_transactions(&self, account: &str, limit: usize)
    -> Result<Vec<FeedTransaction>>;
}
