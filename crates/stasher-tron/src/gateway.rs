//! TronGrid-backed delegation gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use stasher_core::config::TronConfig;
use stasher_core::error::{Result, StasherError};
use stasher_core::{DelegationGateway, ResourceKind, SUN_PER_TRX, StasherConfig, TxId};

use crate::api::{BroadcastResponse, MaxSizeResponse, ResourceListResponse, unsigned_transaction};

/// Delegates ENERGY through TronGrid with an external signer.
pub struct TronGateway {
    client: reqwest::Client,
    config: TronConfig,
    permission_id: u32,
    resource: ResourceKind,
}

impl TronGateway {
    pub fn new(config: TronConfig, permission_id: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| StasherError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            permission_id,
            resource: ResourceKind::Energy,
        })
    }

    pub fn from_config(config: &StasherConfig) -> Result<Self> {
        Self::new(config.tron.clone(), config.account.permission_id)
    }

    fn grid_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.trongrid_url.trim_end_matches('/'), path)
    }

    async fn grid_post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        let resp = self
            .client
            .post(self.grid_url(path))
            .header("TRON-PRO-API-KEY", &self.config.trongrid_api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| StasherError::Gateway(format!("{path} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StasherError::Gateway(format!("{path}: HTTP {status}: {text}")));
        }
        resp.json()
            .await
            .map_err(|e| StasherError::Gateway(format!("{path}: invalid response: {e}")))
    }

    /// Build on the node, sign externally, broadcast.
    async fn submit(&self, path: &str, owner: &str, receiver: &str, amount_trx: u64) -> Result<TxId> {
        let mut body = serde_json::json!({
            "owner_address": owner,
            "receiver_address": receiver,
            "balance": amount_trx * SUN_PER_TRX,
            "resource": self.resource.as_str(),
            "visible": true,
        });
        if self.permission_id > 0 {
            body["Permission_id"] = self.permission_id.into();
        }

        let built: serde_json::Value = self.grid_post(path, &body).await?;
        let (txid, unsigned) = unsigned_transaction(built)?;
        tracing::debug!("🧾 Built {path} transaction {txid}");

        let signed = self.sign(unsigned).await?;
        let broadcast: BroadcastResponse = self.grid_post("wallet/broadcasttransaction", &signed).await?;
        broadcast.into_result(&txid)
    }

    async fn sign(&self, unsigned: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(&self.config.signer_url)
            .json(&unsigned)
            .send()
            .await
            .map_err(|e| StasherError::Gateway(format!("Signer unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(StasherError::Gateway(format!("Signer refused: HTTP {}", resp.status())));
        }
        let signed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| StasherError::Gateway(format!("Signer returned invalid JSON: {e}")))?;
        if signed.get("signature").is_none() {
            return Err(StasherError::Gateway("Signer returned an unsigned transaction".into()));
        }
        Ok(signed)
    }
}

#[async_trait]
impl DelegationGateway for TronGateway {
    fn name(&self) -> &str {
        "trongrid"
    }

    async fn max_delegatable(&self, owner: &str) -> Result<u64> {
        let body = serde_json::json!({
            "owner_address": owner,
            "type": self.resource.code(),
            "visible": true,
        });
        let resp: MaxSizeResponse = self.grid_post("wallet/getcandelegatedmaxsize", &body).await?;
        Ok(resp.max_size)
    }

    async fn active_delegation(&self, owner: &str, receiver: &str) -> Result<u64> {
        let url = format!(
            "{}/api/account/resourcev2",
            self.config.tronscan_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .get(&url)
            .header("TRON-PRO-API-KEY", &self.config.tronscan_api_key)
            .query(&[("address", owner), ("type", "2"), ("resourceType", "2")])
            .send()
            .await
            .map_err(|e| StasherError::Gateway(format!("resourcev2 failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StasherError::Gateway(format!("TronScan API error {status}: {text}")));
        }
        let list: ResourceListResponse = resp
            .json()
            .await
            .map_err(|e| StasherError::Gateway(format!("resourcev2: invalid response: {e}")))?;
        Ok(list.delegated_to(receiver))
    }

    async fn delegate(&self, owner: &str, receiver: &str, amount_trx: u64) -> Result<TxId> {
        let txid = self.submit("wallet/delegateresource", owner, receiver, amount_trx).await?;
        tracing::info!("📤 Delegated {amount_trx} TRX of energy to {receiver} ({txid})");
        Ok(txid)
    }

    async fn undelegate(&self, owner: &str, receiver: &str, amount_trx: u64) -> Result<TxId> {
        let txid = self.submit("wallet/undelegateresource", owner, receiver, amount_trx).await?;
        tracing::info!("📥 Reclaimed {amount_trx} TRX of energy from {receiver} ({txid})");
        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_url_trims_slash() {
        let mut config = TronConfig::default();
        config.trongrid_url = "https://grid.local/".into();
        let gw = TronGateway::new(config, 0).unwrap();
        assert_eq!(
            gw.grid_url("wallet/getcandelegatedmaxsize"),
            "https://grid.local/wallet/getcandelegatedmaxsize"
        );
    }

    #[tokio::test]
    async fn test_unreachable_node_is_gateway_error() {
        let mut config = TronConfig::default();
        config.trongrid_url = "http://127.0.0.1:9".into();
        config.request_timeout_secs = 2;
        let gw = TronGateway::new(config, 3).unwrap();
        let err = gw.max_delegatable("TOwner").await.unwrap_err();
        assert!(matches!(err, StasherError::Gateway(_)));
    }
}
