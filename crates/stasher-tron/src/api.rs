//! Wire types for the TronGrid and TronScan HTTP APIs, and the small parsers
//! that turn them into engine values.

use serde::Deserialize;
use stasher_core::error::{Result, StasherError};
use stasher_core::types::DELEGATE_CONTRACT;
use stasher_core::{FeedTransaction, ResourceKind};

/// TronScan's numeric code for `DelegateResourceContract`.
pub const DELEGATE_CONTRACT_CODE: i64 = 57;

/// `wallet/getcandelegatedmaxsize`
#[derive(Debug, Deserialize)]
pub struct MaxSizeResponse {
    #[serde(default)]
    pub max_size: u64,
}

/// Error shape TronGrid returns with HTTP 200.
#[derive(Debug, Deserialize)]
pub struct GridError {
    #[serde(rename = "Error")]
    pub error: Option<String>,
}

/// `wallet/broadcasttransaction`
#[derive(Debug, Deserialize)]
pub struct BroadcastResponse {
    #[serde(default)]
    pub result: bool,
    pub txid: Option<String>,
    pub code: Option<String>,
    /// Hex-encoded reason.
    pub message: Option<String>,
}

impl BroadcastResponse {
    pub fn into_result(self, fallback_txid: &str) -> Result<String> {
        if self.result {
            return Ok(self.txid.unwrap_or_else(|| fallback_txid.to_string()));
        }
        let reason = self
            .message
            .as_deref()
            .map(decode_hex_message)
            .unwrap_or_default();
        Err(StasherError::Gateway(format!(
            "Broadcast rejected: {} {}",
            self.code.unwrap_or_default(),
            reason
        )))
    }
}

/// Node messages are hex-encoded UTF-8; fall back to the raw text.
pub fn decode_hex_message(msg: &str) -> String {
    hex::decode(msg)
        .ok()
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_else(|| msg.to_string())
}

/// Pull the unsigned transaction out of a build response, or its error.
pub fn unsigned_transaction(body: serde_json::Value) -> Result<(String, serde_json::Value)> {
    if let Ok(GridError { error: Some(e) }) = serde_json::from_value::<GridError>(body.clone()) {
        return Err(StasherError::Gateway(format!("Build failed: {e}")));
    }
    let txid = body
        .get("txID")
        .and_then(|v| v.as_str())
        .ok_or_else(|| StasherError::Gateway(format!("Build returned no txID: {body}")))?
        .to_string();
    Ok((txid, body))
}

/// `api/account/resourcev2`
#[derive(Debug, Deserialize)]
pub struct ResourceListResponse {
    #[serde(default)]
    pub data: Vec<DelegationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationEntry {
    pub receiver_address: Option<String>,
    #[serde(default)]
    pub balance: u64,
}

impl ResourceListResponse {
    /// Sun delegated to `receiver`, 0 when there is no entry.
    pub fn delegated_to(&self, receiver: &str) -> u64 {
        self.data
            .iter()
            .find(|d| d.receiver_address.as_deref() == Some(receiver))
            .map(|d| d.balance)
            .unwrap_or(0)
    }
}

/// `api/transaction`
#[derive(Debug, Deserialize)]
pub struct TransactionListResponse {
    #[serde(default)]
    pub data: Vec<ScanTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTransaction {
    pub hash: String,
    pub timestamp: i64,
    #[serde(default)]
    pub contract_type: i64,
    pub owner_address: Option<String>,
    #[serde(default)]
    pub contract_data: serde_json::Value,
}

impl ScanTransaction {
    pub fn into_feed(self) -> FeedTransaction {
        let is_delegate = self.contract_type == DELEGATE_CONTRACT_CODE;
        let field = |name: &str| {
            self.contract_data
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let receiver = if is_delegate { field("receiver_address") } else { None };
        let resource = if is_delegate {
            // The node omits the field for the default resource.
            Some(match field("resource").as_deref() {
                Some("ENERGY") => ResourceKind::Energy,
                _ => ResourceKind::Bandwidth,
            })
        } else {
            None
        };
        FeedTransaction {
            contract_type: if is_delegate {
                DELEGATE_CONTRACT.to_string()
            } else {
                format!("Contract{}", self.contract_type)
            },
            owner: self.owner_address.clone().or_else(|| field("owner_address")),
            receiver,
            resource,
            hash: self.hash,
            timestamp_ms: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegated_to() {
        let json = r#"{"data":[
            {"receiverAddress":"TOther","balance":5000000},
            {"receiverAddress":"TTarget","balance":123000000}
        ]}"#;
        let resp: ResourceListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.delegated_to("TTarget"), 123_000_000);
        assert_eq!(resp.delegated_to("TNobody"), 0);
    }

    #[test]
    fn test_scan_delegate_transaction() {
        let json = r#"{"data":[{
            "hash":"abc123",
            "timestamp":1767261600000,
            "contractType":57,
            "ownerAddress":"TGrantor",
            "contractData":{"receiver_address":"TOwner","resource":"ENERGY","balance":1000000}
        },{
            "hash":"def456",
            "timestamp":1767261500000,
            "contractType":1,
            "ownerAddress":"TSomeone",
            "contractData":{"amount":5}
        }]}"#;
        let resp: TransactionListResponse = serde_json::from_str(json).unwrap();
        let feed: Vec<FeedTransaction> = resp.data.into_iter().map(ScanTransaction::into_feed).collect();

        assert!(feed[0].is_grant_to("TOwner", ResourceKind::Energy));
        assert_eq!(feed[0].owner.as_deref(), Some("TGrantor"));
        assert_eq!(feed[0].timestamp_ms, 1_767_261_600_000);
        assert_eq!(feed[1].contract_type, "Contract1");
        assert!(feed[1].receiver.is_none());
    }

    #[test]
    fn test_unsigned_transaction() {
        let ok = serde_json::json!({"txID":"t1","raw_data":{},"raw_data_hex":"0a"});
        let (txid, tx) = unsigned_transaction(ok).unwrap();
        assert_eq!(txid, "t1");
        assert_eq!(tx["raw_data_hex"], "0a");

        let err = serde_json::json!({"Error":"balance is not sufficient"});
        assert!(unsigned_transaction(err).is_err());
    }

    #[test]
    fn test_broadcast_result() {
        let ok: BroadcastResponse = serde_json::from_str(r#"{"result":true,"txid":"t9"}"#).unwrap();
        assert_eq!(ok.into_result("fallback").unwrap(), "t9");

        // "bad sig" hex-encoded
        let bad: BroadcastResponse =
            serde_json::from_str(r#"{"code":"SIGERROR","message":"62616420736967"}"#).unwrap();
        let err = bad.into_result("fallback").unwrap_err();
        assert!(err.to_string().contains("SIGERROR bad sig"));
    }

    #[test]
    fn test_decode_hex_message_falls_back_to_raw() {
        assert_eq!(decode_hex_message("62616420736967"), "bad sig");
        // Odd length, non-ASCII, not hex, invalid UTF-8.
        for raw in ["abc", "aé1", "not hex at all", "ff"] {
            assert_eq!(decode_hex_message(raw), raw);
        }
    }
}
