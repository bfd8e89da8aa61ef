//! Cycle orchestration
//!
//! One cooperative loop: each cycle checks the kill switch, capital lock and
//! health checks, requires a `live_trading` approval in live mode, runs the
//! enabled strategies one after another, then snapshots state through the
//! DRP procedure. Dry-run mode runs a single cycle.
//!
//! A capital lock is alerted once when a cycle first finds it engaged; the
//! alert re-arms after a cycle sees trading allowed again.

pub mod registry;

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::agents::{
    founder_gate::ACTION_LIVE_TRADING, CapitalLock, DrpAgent, FounderGate, GateState, Gatekeeper,
    OpsAgent,
};
use crate::chain::{ChainClient, JsonRpcClient};
use crate::config::Config;
use crate::drp::{self, DrpEvent};
use crate::logger::{self, LogTag};
use crate::notifications::{ErrorSeverity, Notification, WebhookNotifier};
use crate::paths;
use crate::tx_engine::{KillSwitch, NonceManager, TransactionBuilder};

pub use registry::{Strategy, StrategyContext, StrategyRegistry};

/// Every long-lived component, wired to one shared gate state
pub struct Runtime {
    pub gates: Arc<GateState>,
    pub kill_switch: KillSwitch,
    pub founder: FounderGate,
    pub capital: Arc<CapitalLock>,
    pub ops: Arc<OpsAgent>,
    pub drp: Arc<DrpAgent>,
    pub builder: Arc<TransactionBuilder>,
    pub notifier: WebhookNotifier,
}

impl Runtime {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let notifier = WebhookNotifier::from_config(&config.ops).map_err(anyhow::Error::msg)?;
        let chain: Arc<dyn ChainClient> = Arc::new(JsonRpcClient::new(&config.rpc)?);

        let gates = Arc::new(GateState::default());
        let kill_switch = KillSwitch::from_config(&config.kill_switch);
        let founder = FounderGate::from_config(&config.founder);
        let capital = Arc::new(CapitalLock::from_config(
            &config.capital,
            gates.clone(),
            founder.clone(),
        ));

        let mut ops = OpsAgent::new(gates.clone(), notifier.clone(), founder.clone());
        register_default_checks(&mut ops, &kill_switch, &capital);

        let drp_ready = last_export_succeeded(&paths::resolve(&config.drp.export_log_file));
        let drp = Arc::new(DrpAgent::new(
            gates.clone(),
            drp::procedure_from_config(&config.drp),
            notifier.clone(),
            drp_ready,
        ));

        let nonces = Arc::new(NonceManager::from_config(chain.clone(), &config.nonce));
        let builder = TransactionBuilder::new(
            chain,
            nonces,
            kill_switch.clone(),
            gates.clone(),
            config.tx.clone(),
        )
        .with_notifier(notifier.clone());

        Ok(Self {
            gates,
            kill_switch,
            founder,
            capital,
            ops: Arc::new(ops),
            drp,
            builder: Arc::new(builder),
            notifier,
        })
    }

    pub fn gatekeeper(&self) -> Gatekeeper {
        Gatekeeper::new(self.kill_switch.clone())
    }
}

/// Health checks every runtime carries
pub fn register_default_checks(ops: &mut OpsAgent, kill_switch: &KillSwitch, capital: &Arc<CapitalLock>) {
    let ks = kill_switch.clone();
    ops.register_check("kill_switch", move || Ok(!ks.triggered()));
    let capital = capital.clone();
    ops.register_check("capital_lock", move || Ok(capital.trade_allowed()));
}

/// Readiness at startup: false only if the latest export was journaled as failed
pub fn last_export_succeeded(export_log: &std::path::Path) -> bool {
    match crate::journal::read_entries::<DrpEvent>(export_log) {
        Ok(events) => events
            .iter()
            .rev()
            .find(|e| !e.dry_run)
            .map(|e| e.event != "failed")
            .unwrap_or(true),
        Err(e) => {
            logger::warning(
                LogTag::Drp,
                &format!("Cannot read {}: {}; assuming ready", export_log.display(), e),
            );
            true
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    KillSwitch,
    CapitalLocked,
    OpsPaused,
    FounderBlocked,
    StrategyFailed(String),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub dry_run: bool,
    pub live: bool,
    pub interval: Duration,
    pub wallet_address: String,
    pub require_founder_for_live: bool,
    pub export_dir: PathBuf,
    pub recover_timeout: Duration,
}

impl OrchestratorSettings {
    /// `live_override` forces live mode; `dry_run_override` forces a single dry cycle
    pub fn from_config(config: &Config, dry_run_override: bool, live_override: bool) -> Self {
        let live = live_override || config.orchestrator.is_live();
        Self {
            dry_run: dry_run_override || !live,
            live: live && !dry_run_override,
            interval: Duration::from_secs(config.orchestrator.interval_secs),
            wallet_address: config.orchestrator.wallet_address.clone(),
            require_founder_for_live: config.founder.require_for_live,
            export_dir: paths::resolve(&config.drp.export_dir),
            recover_timeout: Duration::from_secs(config.drp.recover_timeout_secs),
        }
    }
}

pub struct Orchestrator {
    runtime: Runtime,
    strategies: Vec<Box<dyn Strategy>>,
    settings: OrchestratorSettings,
    capital_alerted: AtomicBool,
}

impl Orchestrator {
    pub fn new(runtime: Runtime, strategies: Vec<Box<dyn Strategy>>, settings: OrchestratorSettings) -> Self {
        Self {
            runtime,
            strategies,
            settings,
            capital_alerted: AtomicBool::new(false),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    fn context(&self) -> StrategyContext {
        StrategyContext {
            wallet_address: self.settings.wallet_address.clone(),
            dry_run: self.settings.dry_run,
            builder: self.runtime.builder.clone(),
            capital: self.runtime.capital.clone(),
            ops: self.runtime.ops.clone(),
        }
    }

    pub async fn run_once(&self) -> CycleOutcome {
        let rt = &self.runtime;

        if rt.kill_switch.triggered() {
            rt.kill_switch.record_kill_event("orchestrator");
            return CycleOutcome::KillSwitch;
        }

        if !rt.capital.trade_allowed() {
            logger::warning(LogTag::Orchestrator, "Cycle skipped: capital locked");
            if !self.capital_alerted.swap(true, Ordering::SeqCst) {
                let capital = rt.capital.snapshot();
                rt.notifier
                    .send_best_effort(&Notification::capital_locked(
                        capital.balance,
                        capital.drawdown_pct,
                        capital.losses,
                    ))
                    .await;
            }
            return CycleOutcome::CapitalLocked;
        }
        self.capital_alerted.store(false, Ordering::SeqCst);

        let failures = rt.ops.run_checks();
        if !failures.is_empty() {
            rt.ops
                .notify(&format!("Health checks failed: {}", failures.join(", ")))
                .await;
        }
        if rt.ops.paused() {
            logger::warning(
                LogTag::Orchestrator,
                &format!(
                    "Cycle skipped: ops paused ({})",
                    rt.ops.pause_reason().unwrap_or_default()
                ),
            );
            return CycleOutcome::OpsPaused;
        }

        if self.settings.live
            && self.settings.require_founder_for_live
            && !rt.founder.approved(ACTION_LIVE_TRADING)
        {
            logger::error(
                LogTag::Orchestrator,
                "Cycle skipped: live mode requires a live_trading approval",
            );
            return CycleOutcome::FounderBlocked;
        }

        if !rt.drp.is_ready() {
            match rt
                .drp
                .auto_recover(&self.settings.export_dir, self.settings.recover_timeout)
                .await
            {
                Ok(true) => logger::warning(LogTag::Orchestrator, "DRP auto-recovery completed"),
                Ok(false) => {}
                Err(e) => logger::error(
                    LogTag::Orchestrator,
                    &format!("DRP auto-recovery failed: {}", e),
                ),
            }
        }

        let ctx = self.context();
        for strategy in &self.strategies {
            if let Err(e) = strategy.run_once(&ctx).await {
                logger::error(
                    LogTag::Orchestrator,
                    &format!("Strategy '{}' failed: {:#}", strategy.id(), e),
                );
                rt.ops.auto_pause_and_notify("strategy_fail").await;
                return CycleOutcome::StrategyFailed(strategy.id().to_string());
            }
        }

        self.snapshot_state().await;
        logger::info(LogTag::Orchestrator, "Cycle complete");
        CycleOutcome::Completed
    }

    /// Export failure degrades readiness without stopping the cycle
    async fn snapshot_state(&self) {
        let rt = &self.runtime;
        match rt.drp.procedure().export(self.settings.dry_run).await {
            Ok(archive) => {
                if let Some(archive) = archive {
                    logger::debug(
                        LogTag::Orchestrator,
                        &format!("Cycle snapshot {}", archive.display()),
                    );
                }
                rt.drp.record_export(true);
            }
            Err(e) => {
                logger::error(LogTag::Orchestrator, &format!("Cycle snapshot failed: {}", e));
                rt.drp.record_export(false);
                rt.notifier
                    .send_best_effort(&Notification::system_error(
                        format!("DRP export failed: {}", e),
                        ErrorSeverity::Error,
                    ))
                    .await;
            }
        }
    }

    /// Run cycles until one halts; a dry run stops after the first
    pub async fn run_loop(&self) -> CycleOutcome {
        logger::info(
            LogTag::Orchestrator,
            &format!(
                "Starting orchestrator: mode={} strategies={} interval={}s",
                if self.settings.live { "live" } else { "dry-run" },
                self.strategies.len(),
                self.settings.interval.as_secs()
            ),
        );

        let mut cycles: u64 = 0;
        loop {
            let outcome = self.run_once().await;
            cycles += 1;
            if !outcome.is_completed() {
                logger::error(
                    LogTag::Orchestrator,
                    &format!("Halting after {} cycles: {:?}", cycles, outcome),
                );
                return outcome;
            }
            if self.settings.dry_run {
                return outcome;
            }
            tokio::time::sleep(self.settings.interval).await;
        }
    }
}
