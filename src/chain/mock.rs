//! Scripted in-memory chain used by unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ChainClient;
use crate::errors::ChainError;

#[derive(Default)]
pub struct MockChain {
    pub counts: Mutex<HashMap<String, u64>>,
    pub gas: Mutex<Option<Result<u64, ChainError>>>,
    /// Scripted send outcomes, consumed in order; when empty sends succeed
    pub send_script: Mutex<VecDeque<Result<String, ChainError>>>,
    pub always_fail_send: Mutex<Option<ChainError>>,
    pub count_calls: AtomicUsize,
    pub estimate_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(self, address: &str, count: u64) -> Self {
        self.counts.lock().insert(address.to_lowercase(), count);
        self
    }

    pub fn with_gas(self, gas: Result<u64, ChainError>) -> Self {
        *self.gas.lock() = Some(gas);
        self
    }

    pub fn failing_sends(self, error: ChainError) -> Self {
        *self.always_fail_send.lock() = Some(error);
        self
    }

    pub fn scripted_sends(self, outcomes: Vec<Result<String, ChainError>>) -> Self {
        *self.send_script.lock() = outcomes.into();
        self
    }

    pub fn network_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
            + self.estimate_calls.load(Ordering::SeqCst)
            + self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn transaction_count(&self, address: &str) -> Result<u64, ChainError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.counts.lock().get(&address.to_lowercase()).unwrap_or(&0))
    }

    async fn estimate_gas(&self, _payload: &[u8], _from: &str) -> Result<u64, ChainError> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        self.gas.lock().clone().unwrap_or(Ok(21_000))
    }

    async fn send_raw_transaction(&self, payload: &[u8]) -> Result<String, ChainError> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(err) = self.always_fail_send.lock().clone() {
            return Err(err);
        }
        if let Some(outcome) = self.send_script.lock().pop_front() {
            return outcome;
        }
        Ok(format!("0xhash{}_{}", n, payload.len()))
    }
}
