use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-supplied metadata carried into every tx journal line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxContext {
    pub strategy_id: String,
    pub mutation_id: String,
    pub risk_level: String,
}

impl TxContext {
    pub fn new(strategy_id: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            mutation_id: std::env::var("MUTATION_ID").unwrap_or_else(|_| "dev".to_string()),
            risk_level: "normal".to_string(),
        }
    }

    pub fn with_risk_level(mut self, risk_level: impl Into<String>) -> Self {
        self.risk_level = risk_level.into();
        self
    }

    pub fn with_mutation_id(mut self, mutation_id: impl Into<String>) -> Self {
        self.mutation_id = mutation_id.into();
        self
    }
}

impl Default for TxContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Sent,
    Failed,
    Killed,
    GasEstimateFailed,
}

/// One line of the transaction journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_id: String,
    pub from_address: String,
    pub gas_estimate: Option<u64>,
    pub nonce: Option<u64>,
    pub tx_hash: Option<String>,
    pub kill_triggered: bool,
    pub status: TxStatus,
    pub error: Option<String>,
    pub strategy_id: String,
    pub mutation_id: String,
    pub risk_level: String,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl TxRecord {
    pub fn new(tx_id: &str, from_address: &str, ctx: &TxContext, status: TxStatus) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            from_address: from_address.to_string(),
            gas_estimate: None,
            nonce: None,
            tx_hash: None,
            kill_triggered: false,
            status,
            error: None,
            strategy_id: ctx.strategy_id.clone(),
            mutation_id: ctx.mutation_id.clone(),
            risk_level: ctx.risk_level.clone(),
            attempt: 0,
            timestamp: Utc::now(),
        }
    }
}
