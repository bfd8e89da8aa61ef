//! Strategy registry
//!
//! Strategies are resolved by id from configuration through constructor
//! functions registered up front. Unknown ids and constructor errors are
//! logged and skipped so one bad entry does not stop the others loading.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agents::{CapitalLock, OpsAgent};
use crate::logger::{self, LogTag};
use crate::tx_engine::TransactionBuilder;

/// What a strategy gets to work with each cycle
#[derive(Clone)]
pub struct StrategyContext {
    pub wallet_address: String,
    pub dry_run: bool,
    pub builder: Arc<TransactionBuilder>,
    pub capital: Arc<CapitalLock>,
    pub ops: Arc<OpsAgent>,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn id(&self) -> &str;

    /// One decision cycle; an error aborts the cycle and pauses trading
    async fn run_once(&self, ctx: &StrategyContext) -> anyhow::Result<()>;
}

pub type StrategyConstructor = fn(&toml::Table) -> anyhow::Result<Box<dyn Strategy>>;

#[derive(Default)]
pub struct StrategyRegistry {
    constructors: BTreeMap<String, StrategyConstructor>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the strategies shipped in this crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(HEARTBEAT_ID, Heartbeat::construct);
        registry
    }

    pub fn register(&mut self, id: &str, constructor: StrategyConstructor) {
        if self.constructors.insert(id.to_string(), constructor).is_some() {
            logger::warning(
                LogTag::Orchestrator,
                &format!("Strategy '{}' registered twice; keeping the latest", id),
            );
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build(&self, id: &str, params: &toml::Table) -> anyhow::Result<Box<dyn Strategy>> {
        let constructor = self
            .constructors
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("unknown strategy '{}'", id))?;
        constructor(params)
    }

    /// Build every enabled id, with its parameter table from `params[id]`
    pub fn build_enabled(&self, enabled: &[String], params: &toml::Table) -> Vec<Box<dyn Strategy>> {
        let empty = toml::Table::new();
        let mut strategies = Vec::new();
        for id in enabled {
            let table = params.get(id).and_then(|v| v.as_table()).unwrap_or(&empty);
            match self.build(id, table) {
                Ok(strategy) => {
                    logger::info(LogTag::Orchestrator, &format!("Strategy '{}' loaded", id));
                    strategies.push(strategy);
                }
                Err(e) => logger::error(
                    LogTag::Orchestrator,
                    &format!("Strategy '{}' failed to load: {}", id, e),
                ),
            }
        }
        strategies
    }
}

pub const HEARTBEAT_ID: &str = "heartbeat";

/// Liveness strategy: reports gate and capital state once per cycle
pub struct Heartbeat {
    label: String,
}

impl Heartbeat {
    fn construct(params: &toml::Table) -> anyhow::Result<Box<dyn Strategy>> {
        let label = match params.get("label") {
            Some(value) => value
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("heartbeat.label must be a string"))?
                .to_string(),
            None => HEARTBEAT_ID.to_string(),
        };
        Ok(Box::new(Heartbeat { label }))
    }
}

#[async_trait]
impl Strategy for Heartbeat {
    fn id(&self) -> &str {
        HEARTBEAT_ID
    }

    async fn run_once(&self, ctx: &StrategyContext) -> anyhow::Result<()> {
        let capital = ctx.capital.snapshot();
        logger::info(
            LogTag::Orchestrator,
            &format!(
                "[{}] wallet={} dry_run={} balance={:.2} drawdown={:.2}%",
                self.label,
                if ctx.wallet_address.is_empty() { "-" } else { ctx.wallet_address.as_str() },
                ctx.dry_run,
                capital.balance,
                capital.drawdown_pct
            ),
        );
        Ok(())
    }
}
