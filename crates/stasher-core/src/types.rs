//! Plain data types shared between the engine and its collaborators.

use serde::{Deserialize, Serialize};

/// Transaction identifier returned by the chain.
pub type TxId = String;

/// 1 TRX = 1_000_000 sun.
pub const SUN_PER_TRX: u64 = 1_000_000;

/// Whole TRX contained in a sun amount (floored).
pub fn sun_to_trx(sun: u64) -> u64 {
    sun / SUN_PER_TRX
}

/// Staked resource kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceKind {
    Energy,
    Bandwidth,
}

impl ResourceKind {
    /// Numeric code used by the TRON HTTP API (`type` / `resource` fields).
    pub fn code(&self) -> u8 {
        match self {
            ResourceKind::Bandwidth => 0,
            ResourceKind::Energy => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Energy => "ENERGY",
            ResourceKind::Bandwidth => "BANDWIDTH",
        }
    }
}

/// Contract type of a resource delegation.
pub const DELEGATE_CONTRACT: &str = "DelegateResourceContract";

/// One entry of the account's transaction history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedTransaction {
    /// Transaction hash.
    pub hash: String,
    /// Block timestamp, milliseconds since the unix epoch.
    pub timestamp_ms: i64,
    /// Contract / operation discriminator, e.g. `DelegateResourceContract`.
    pub contract_type: String,
    /// Sender of the contract call, when known.
    #[serde(default)]
    pub owner: Option<String>,
    /// Receiver, present for delegation contracts.
    #[serde(default)]
    pub receiver: Option<String>,
    /// Delegated resource, present for delegation contracts.
    #[serde(default)]
    pub resource: Option<ResourceKind>,
}

impl FeedTransaction {
    /// True when this transaction delegates `resource` to `account`.
    pub fn is_grant_to(&self, account: &str, resource: ResourceKind) -> bool {
        self.contract_type == DELEGATE_CONTRACT
            && self.receiver.as_deref() == Some(account)
            && self.resource == Some(resource)
    }
}
