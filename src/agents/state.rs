//! Shared gate flags
//!
//! One `Arc<GateState>` is created at startup and handed to every agent and to
//! the transaction builder. Agents publish, dispatch paths re-read on every
//! check. Flags start in the safe-to-trade position except DRP readiness,
//! which is only raised by a successful export or recovery.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::GateReason;

#[derive(Debug)]
pub struct GateState {
    paused: AtomicBool,
    capital_locked: AtomicBool,
    drp_ready: AtomicBool,
}

impl Default for GateState {
    fn default() -> Self {
        Self::new(false)
    }
}

impl GateState {
    pub fn new(drp_ready: bool) -> Self {
        Self {
            paused: AtomicBool::new(false),
            capital_locked: AtomicBool::new(false),
            drp_ready: AtomicBool::new(drp_ready),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Returns the previous value
    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::SeqCst)
    }

    pub fn is_capital_locked(&self) -> bool {
        self.capital_locked.load(Ordering::SeqCst)
    }

    pub fn set_capital_locked(&self, locked: bool) {
        self.capital_locked.store(locked, Ordering::SeqCst);
    }

    pub fn is_drp_ready(&self) -> bool {
        self.drp_ready.load(Ordering::SeqCst)
    }

    pub fn set_drp_ready(&self, ready: bool) {
        self.drp_ready.store(ready, Ordering::SeqCst);
    }

    /// First closed gate in evaluation order, if any
    pub fn first_red(&self) -> Option<GateReason> {
        if self.is_capital_locked() {
            Some(GateReason::CapitalLock)
        } else if self.is_paused() {
            Some(GateReason::OpsPaused)
        } else if !self.is_drp_ready() {
            Some(GateReason::DrpNotReady)
        } else {
            None
        }
    }

    pub fn all_green(&self) -> bool {
        self.first_red().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drp_not_ready_until_published() {
        let gates = GateState::default();
        assert_eq!(gates.first_red(), Some(GateReason::DrpNotReady));
        gates.set_drp_ready(true);
        assert!(gates.all_green());
    }

    #[test]
    fn test_capital_lock_reported_first() {
        let gates = GateState::new(false);
        gates.set_paused(true);
        gates.set_capital_locked(true);
        assert_eq!(gates.first_red(), Some(GateReason::CapitalLock));
        gates.set_capital_locked(false);
        assert_eq!(gates.first_red(), Some(GateReason::OpsPaused));
    }

    #[test]
    fn test_set_paused_returns_previous() {
        let gates = GateState::new(true);
        assert!(!gates.set_paused(true));
        assert!(gates.set_paused(true));
    }
}
