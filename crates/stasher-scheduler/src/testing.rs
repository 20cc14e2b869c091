//! In-memory gateway and feed used by the scheduler tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use stasher_core::error::{Result, StasherError};
use stasher_core::{DelegationGateway, FeedTransaction, TransactionFeed, TxId};

/// Scriptable gateway that counts every call.
#[derive(Default)]
pub struct MockGateway {
    pub max_sun: Mutex<u64>,
    pub active_sun: Mutex<u64>,
    pub fail_delegate: Mutex<bool>,
    pub fail_undelegate: Mutex<bool>,
    pub fail_queries: Mutex<bool>,
    pub delegate_calls: AtomicUsize,
    pub undelegate_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub last_amount: Mutex<Option<u64>>,
}

impl MockGateway {
    pub fn with_balance(max_sun: u64) -> Self {
        let gw = Self::default();
        *gw.max_sun.lock().unwrap() = max_sun;
        gw
    }

    pub fn set_active(&self, sun: u64) {
        *self.active_sun.lock().unwrap() = sun;
    }

    pub fn set_fail_delegate(&self, fail: bool) {
        *self.fail_delegate.lock().unwrap() = fail;
    }

    pub fn set_fail_undelegate(&self, fail: bool) {
        *self.fail_undelegate.lock().unwrap() = fail;
    }

    pub fn delegates(&self) -> usize {
        self.delegate_calls.load(Ordering::SeqCst)
    }

    pub fn undelegates(&self) -> usize {
        self.undelegate_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DelegationGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn max_delegatable(&self, _owner: &str) -> Result<u64> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_queries.lock().unwrap() {
            return Err(StasherError::Gateway("query down".into()));
        }
        Ok(*self.max_sun.lock().unwrap())
    }

    async fn active_delegation(&self, _owner: &str, _receiver: &str) -> Result<u64> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_queries.lock().unwrap() {
            return Err(StasherError::Gateway("query down".into()));
        }
        Ok(*self.active_sun.lock().unwrap())
    }

    async fn delegate(&self, _owner: &str, _receiver: &str, amount_trx: u64) -> Result<TxId> {
        let n = self.delegate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_delegate.lock().unwrap() {
            return Err(StasherError::Gateway("broadcast rejected".into()));
        }
        *self.last_amount.lock().unwrap() = Some(amount_trx);
        self.set_active(amount_trx * stasher_core::SUN_PER_TRX);
        Ok(format!("delegate-{n}"))
    }

    async fn undelegate(&self, _owner: &str, _receiver: &str, amount_trx: u64) -> Result<TxId> {
        let n = self.undelegate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_undelegate.lock().unwrap() {
            return Err(StasherError::Gateway("broadcast rejected".into()));
        }
        *self.last_amount.lock().unwrap() = Some(amount_trx);
        self.set_active(0);
        Ok(format!("undelegate-{n}"))
    }
}

/// Feed returning a fixed batch, optionally failing.
#[derive(Default)]
pub struct MockFeed {
    pub transactions: Mutex<Vec<FeedTransaction>>,
    pub fail: Mutex<bool>,
    pub calls: AtomicUsize,
}

impl MockFeed {
    pub fn with(transactions: Vec<FeedTransaction>) -> Self {
        Self {
            transactions: Mutex::new(transactions),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionFeed for MockFeed {
    async fn recent_transactions(
        &self,
        _account: &str,
        limit: usize,
    ) -> Result<Vec<FeedTransaction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(StasherError::Feed("feed unavailable".into()));
        }
        Ok(self.transactions.lock().unwrap().iter().take(limit).cloned().collect())
    }
}
