//! TronScan transaction history feed.

use std::time::Duration;

use async_trait::async_trait;
use stasher_core::config::TronConfig;
use stasher_core::error::{Result, StasherError};
use stasher_core::{FeedTransaction, TransactionFeed};

use crate::api::{ScanTransaction, TransactionListResponse};

pub struct TronScanFeed {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TronScanFeed {
    pub fn new(config: &TronConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StasherError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.tronscan_url.trim_end_matches('/').to_string(),
            api_key: config.tronscan_api_key.clone(),
        })
    }
}

#[async_trait]
impl TransactionFeed for TronScanFeed {
    async fn recent_transactions(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<FeedTransaction>> {
        let limit = limit.to_string();
        let resp = self
            .client
            .get(format!("{}/api/transaction", self.base_url))
            .header("TRON-PRO-API-KEY", &self.api_key)
            .query(&[
                ("sort", "-timestamp"),
                ("count", "true"),
                ("start", "0"),
                ("limit", limit.as_str()),
                ("address", account),
            ])
            .send()
            .await
            .map_err(|e| StasherError::Feed(format!("TronScan request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StasherError::Feed(format!("TronScan API error {status}: {text}")));
        }

        let list: TransactionListResponse = resp
            .json()
            .await
            .map_err(|e| StasherError::Feed(format!("Invalid TronScan response: {e}")))?;
        tracing::debug!("🔎 Fetched {} transactions for {account}", list.data.len());
        Ok(list.data.into_iter().map(ScanTransaction::into_feed).collect())
    }
}
