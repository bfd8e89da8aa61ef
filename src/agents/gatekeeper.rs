//! Composite trading gate
//!
//! Evaluates, in order: kill switch, capital lock, ops pause, DRP readiness.
//! The first closed gate wins and is logged. Nothing is cached between calls.

use serde::Serialize;

use crate::errors::GateReason;
use crate::logger::{self, LogTag};
use crate::tx_engine::KillSwitch;

/// Capital-side permission to trade
pub trait TradeGate: Send + Sync {
    fn trade_allowed(&self) -> bool;
}

/// Operational pause flag
pub trait PauseSignal: Send + Sync {
    fn paused(&self) -> bool;
}

/// Whether the last DRP snapshot is usable
pub trait RecoveryReadiness: Send + Sync {
    fn is_ready(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFailure {
    KillSwitch,
    CapitalLock,
    OpsPaused,
    DrpNotReady,
}

impl GateFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateFailure::KillSwitch => "kill_switch",
            GateFailure::CapitalLock => "capital_lock",
            GateFailure::OpsPaused => "ops_paused",
            GateFailure::DrpNotReady => "drp_not_ready",
        }
    }

    /// Shared-flag reason, `None` for the kill switch
    pub fn gate_reason(&self) -> Option<GateReason> {
        match self {
            GateFailure::KillSwitch => None,
            GateFailure::CapitalLock => Some(GateReason::CapitalLock),
            GateFailure::OpsPaused => Some(GateReason::OpsPaused),
            GateFailure::DrpNotReady => Some(GateReason::DrpNotReady),
        }
    }
}

impl std::fmt::Display for GateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub passed: bool,
    pub failed_gate: Option<GateFailure>,
}

impl GateDecision {
    fn pass() -> Self {
        Self {
            passed: true,
            failed_gate: None,
        }
    }

    fn fail(gate: GateFailure) -> Self {
        Self {
            passed: false,
            failed_gate: Some(gate),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gatekeeper {
    kill_switch: KillSwitch,
}

impl Gatekeeper {
    pub fn new(kill_switch: KillSwitch) -> Self {
        Self { kill_switch }
    }

    pub fn evaluate(
        &self,
        capital: &dyn TradeGate,
        ops: &dyn PauseSignal,
        drp: &dyn RecoveryReadiness,
    ) -> GateDecision {
        let decision = if self.kill_switch.triggered() {
            GateDecision::fail(GateFailure::KillSwitch)
        } else if !capital.trade_allowed() {
            GateDecision::fail(GateFailure::CapitalLock)
        } else if ops.paused() {
            GateDecision::fail(GateFailure::OpsPaused)
        } else if !drp.is_ready() {
            GateDecision::fail(GateFailure::DrpNotReady)
        } else {
            GateDecision::pass()
        };

        match decision.failed_gate {
            Some(gate) => logger::warning(LogTag::Gate, &format!("Gate closed: {}", gate)),
            None => logger::debug(LogTag::Gate, "All gates green"),
        }
        decision
    }

    pub fn gates_green(
        &self,
        capital: &dyn TradeGate,
        ops: &dyn PauseSignal,
        drp: &dyn RecoveryReadiness,
    ) -> bool {
        self.evaluate(capital, ops, drp).passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_engine::kill_switch::tests::test_switch;
    use tempfile::TempDir;

    struct Flag(bool);

    impl TradeGate for Flag {
        fn trade_allowed(&self) -> bool {
            self.0
        }
    }
    impl PauseSignal for Flag {
        fn paused(&self) -> bool {
            self.0
        }
    }
    impl RecoveryReadiness for Flag {
        fn is_ready(&self) -> bool {
            self.0
        }
    }

    fn keeper(dir: &TempDir, env_var: &str) -> Gatekeeper {
        Gatekeeper::new(test_switch(dir, env_var))
    }

    #[test]
    fn test_all_clear() {
        let dir = TempDir::new().unwrap();
        let gk = keeper(&dir, "TG_GK_CLEAR");
        assert!(gk.gates_green(&Flag(true), &Flag(false), &Flag(true)));
    }

    #[test]
    fn test_each_single_failure_closes_gate() {
        let dir = TempDir::new().unwrap();
        let gk = keeper(&dir, "TG_GK_SINGLE");

        let d = gk.evaluate(&Flag(false), &Flag(false), &Flag(true));
        assert_eq!(d.failed_gate, Some(GateFailure::CapitalLock));
        let d = gk.evaluate(&Flag(true), &Flag(true), &Flag(true));
        assert_eq!(d.failed_gate, Some(GateFailure::OpsPaused));
        let d = gk.evaluate(&Flag(true), &Flag(false), &Flag(false));
        assert_eq!(d.failed_gate, Some(GateFailure::DrpNotReady));
        assert!(!d.passed);

        gk.kill_switch.engage("test").unwrap();
        let d = gk.evaluate(&Flag(true), &Flag(false), &Flag(true));
        assert_eq!(d.failed_gate, Some(GateFailure::KillSwitch));
    }

    #[test]
    fn test_kill_switch_checked_first() {
        let dir = TempDir::new().unwrap();
        let gk = keeper(&dir, "TG_GK_ORDER");
        std::env::set_var("TG_GK_ORDER", "1");
        let d = gk.evaluate(&Flag(false), &Flag(true), &Flag(false));
        std::env::remove_var("TG_GK_ORDER");
        assert_eq!(d.failed_gate, Some(GateFailure::KillSwitch));
    }
}
