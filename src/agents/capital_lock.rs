//! Drawdown and loss circuit breaker
//!
//! Trips when drawdown from the running peak exceeds `max_drawdown_pct` or
//! cumulative realized losses exceed `max_loss_usd`. Once tripped it stays
//! blocked until an approved unlock; trades recorded while blocked are
//! logged and dropped.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use super::founder_gate::{FounderGate, ACTION_CAPITAL_UNLOCK};
use super::gatekeeper::TradeGate;
use super::state::GateState;
use crate::config::CapitalConfig;
use crate::logger::{self, LogTag};
use crate::metrics;

/// Point-in-time view of the breaker
#[derive(Debug, Clone, Serialize)]
pub struct CapitalSnapshot {
    pub balance: f64,
    pub peak_balance: f64,
    pub losses: f64,
    pub drawdown_pct: f64,
    pub blocked: bool,
    pub trades: usize,
}

#[derive(Debug)]
struct CapitalState {
    balance: f64,
    peak_balance: f64,
    losses: f64,
    blocked: bool,
    trades: Vec<f64>,
}

impl CapitalState {
    fn drawdown_pct(&self) -> f64 {
        if self.peak_balance <= 0.0 {
            return 0.0;
        }
        (self.peak_balance - self.balance) / self.peak_balance * 100.0
    }
}

pub struct CapitalLock {
    max_drawdown_pct: f64,
    max_loss_usd: f64,
    enabled: bool,
    state: Mutex<CapitalState>,
    gates: Arc<GateState>,
    founder: FounderGate,
}

impl CapitalLock {
    pub fn new(
        max_drawdown_pct: f64,
        max_loss_usd: f64,
        starting_balance: f64,
        gates: Arc<GateState>,
        founder: FounderGate,
    ) -> Self {
        gates.set_capital_locked(false);
        Self {
            max_drawdown_pct,
            max_loss_usd,
            enabled: true,
            state: Mutex::new(CapitalState {
                balance: starting_balance,
                peak_balance: starting_balance,
                losses: 0.0,
                blocked: false,
                trades: Vec::new(),
            }),
            gates,
            founder,
        }
    }

    pub fn from_config(config: &CapitalConfig, gates: Arc<GateState>, founder: FounderGate) -> Self {
        let mut lock = Self::new(
            config.max_drawdown_pct,
            config.max_loss_usd,
            config.starting_capital_usd,
            gates,
            founder,
        );
        lock.enabled = config.enabled;
        lock
    }

    /// Apply a realized pnl; returns true if this trade tripped the breaker
    pub fn record_trade(&self, pnl_usd: f64) -> bool {
        let mut state = self.state.lock();
        if state.blocked {
            logger::warning(
                LogTag::Capital,
                &format!("Trade pnl={:.2} ignored: capital locked", pnl_usd),
            );
            return false;
        }

        state.balance += pnl_usd;
        state.trades.push(pnl_usd);
        state.peak_balance = state.peak_balance.max(state.balance);
        if pnl_usd < 0.0 {
            state.losses += pnl_usd.abs();
        }

        if !self.enabled {
            return false;
        }

        let drawdown = state.drawdown_pct();
        if drawdown > self.max_drawdown_pct || state.losses > self.max_loss_usd {
            state.blocked = true;
            self.gates.set_capital_locked(true);
            metrics::global().record_alert();
            logger::error(
                LogTag::Capital,
                &format!(
                    "Capital lock engaged: balance={:.2} peak={:.2} drawdown={:.2}% (max {:.2}%) losses={:.2} (max {:.2})",
                    state.balance,
                    state.peak_balance,
                    drawdown,
                    self.max_drawdown_pct,
                    state.losses,
                    self.max_loss_usd
                ),
            );
            return true;
        }

        logger::debug(
            LogTag::Capital,
            &format!(
                "Trade pnl={:.2} balance={:.2} drawdown={:.2}% losses={:.2}",
                pnl_usd, state.balance, drawdown, state.losses
            ),
        );
        false
    }

    pub fn trade_allowed(&self) -> bool {
        !self.state.lock().blocked
    }

    /// Re-open the breaker
    ///
    /// Needs both the caller's approval and a live `capital_unlock` token
    /// (`founder_token`, or the ambient one when `None`).
    pub fn unlock(&self, approved: bool, founder_token: Option<&str>) -> bool {
        if !approved || !self.founder.check(ACTION_CAPITAL_UNLOCK, founder_token) {
            logger::warning(LogTag::Capital, "Capital unlock rejected");
            return false;
        }

        let mut state = self.state.lock();
        state.blocked = false;
        state.losses = 0.0;
        state.peak_balance = state.balance;
        self.gates.set_capital_locked(false);

        logger::warning(
            LogTag::Capital,
            &format!("Capital lock released at balance {:.2}", state.balance),
        );
        true
    }

    pub fn snapshot(&self) -> CapitalSnapshot {
        let state = self.state.lock();
        CapitalSnapshot {
            balance: state.balance,
            peak_balance: state.peak_balance,
            losses: state.losses,
            drawdown_pct: state.drawdown_pct(),
            blocked: state.blocked,
            trades: state.trades.len(),
        }
    }
}

impl TradeGate for CapitalLock {
    fn trade_allowed(&self) -> bool {
        CapitalLock::trade_allowed(self)
    }
}
